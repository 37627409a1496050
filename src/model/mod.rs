//! The in-memory object model for a GIF stream: [`Stream`], [`Image`], [`Colormap`], and the
//! smaller pieces attached to them ([`Comment`], [`Extension`]).

mod color;
mod colormap;
mod comment;
mod extension;
mod image;
mod stream;

pub use color::Color;
pub use colormap::{min_code_bits_for, padded_len_for, Colormap, MAX_COLORS};
pub use comment::Comment;
pub use extension::{Extension, ExtensionTarget};
pub use image::{Disposal, Image, ImageData};
pub use stream::{LoopCount, Stream};
