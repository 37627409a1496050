//! GIF stream encoding and decoding: turning bytes into a [`crate::model::Stream`] and back.

pub mod reader;
pub mod writer;

pub use reader::{read_stream, ReadError, ReadFlags};
pub use writer::{write_stream, IncrementalWriter, WriteError};
