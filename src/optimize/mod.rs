//! Animation optimization: shrinking a sequence of full-screen frames down to the smallest
//! rectangle that actually changed each time, substituting transparency for pixels that
//! would've been redundant anyway, and building one shared global colour table across every
//! frame instead of a local colour table per frame.
//!
//! Mirrors the reference optimizer's three-pass structure: [`subimage::build_subimages`]
//! (difference bounds + disposal selection), [`colormap::build_shared_colormap`] (the unified
//! "all colors seen" table and the penalty-weighted cut down to 256 entries), and
//! [`frame_data::finish`] (remapping each subimage's pixels into the chosen colour table,
//! falling back to a per-frame local colormap when the shared table has no room).

mod colormap;
mod frame_data;
mod subimage;

use thiserror::Error;

use crate::model::Stream;

pub use subimage::Subimage;

#[derive(Error, Debug)]
pub enum OptimizeError {
	#[error("stream has no images")]
	Empty,
	#[error("stream has no global or local colormap on image {0}")]
	MissingColormap(usize),
}

/// How aggressively transparency is substituted for redundant pixels: `1` never substitutes
/// (except the first frame, when its background is already transparent), `2` substitutes
/// whenever it's profitable (runs of two or more adjacent redundant pixels), `3` additionally
/// tries substituting isolated single redundant pixels and keeps that if it compresses smaller.
/// Values outside `1..=3` are clamped by [`optimize`].
pub type OptimizeLevel = u8;

#[derive(Debug, Clone, Copy)]
pub struct OptimizeFlags {
	pub level: OptimizeLevel,
	/// Whether entirely-transparent single-pixel placeholder frames (produced by some encoders
	/// to pad out delays) should be kept, or folded into the previous frame's delay.
	pub keep_empty_frames: bool,
}

impl Default for OptimizeFlags {
	fn default() -> Self {
		OptimizeFlags { level: 2, keep_empty_frames: false }
	}
}

/// Optimizes `stream` in place: every image is replaced by the smallest region that changed
/// since the last frame (given its chosen disposal method), and every image is remapped onto
/// one shared global colour table wherever that fits in 256 colours.
pub fn optimize(stream: &mut Stream, mut flags: OptimizeFlags) -> Result<(), OptimizeError> {
	if stream.is_empty() {
		return Err(OptimizeError::Empty);
	}

	for (i, image) in stream.images.iter().enumerate() {
		if stream.global_colormap.is_none() && image.local_colormap.is_none() {
			return Err(OptimizeError::MissingColormap(i));
		}
	}

	flags.level = flags.level.clamp(1, 3);

	let subimages = subimage::build_subimages(stream);
	let assignment = colormap::build_shared_colormap(stream, &subimages);
	frame_data::finish(stream, subimages, assignment, flags);

	Ok(())
}
