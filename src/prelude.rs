//! Re-exports the types most callers need, so `use gifsicle::prelude::*;` is usually enough.

pub use crate::codec::{read_stream, write_stream, IncrementalWriter, ReadError, ReadFlags, WriteError};
pub use crate::merge::{merge_frame_interval, merge_image, merge_stream, MergeConfig, MergeError, MergeRecord};
pub use crate::model::{
	Color, Colormap, Comment, Disposal, Extension, ExtensionTarget, Image, ImageData, LoopCount, Stream,
};
pub use crate::optimize::{optimize, OptimizeError, OptimizeFlags};
pub use crate::transform::{
	crop_image, flip_image_horizontal, flip_image_vertical, resize_stream, rotate_image, scale_image,
	ColorChange, ColorTransformPipeline, Crop, Rotation,
};
pub use crate::unoptimize::{unoptimize, UnoptimizeError, UnoptimizeFlags};
