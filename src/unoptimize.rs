//! Reverses animation optimization: turns a stream of small, transparency-punched,
//! previous-frame-relative images back into full-screen, self-contained frames.
//!
//! Requires every image to share the stream's global colour table (no local colour tables);
//! [`unoptimize`] fails with [`UnoptimizeError::LocalColormapPresent`] otherwise, matching the
//! reference implementation's refusal to unoptimize a stream it can't track a single shared
//! palette for.

use thiserror::Error;

use crate::model::{Colormap, Disposal, Image, ImageData, Stream};

/// Sentinel screen value meaning "transparent", kept out of the 0-255 colour index range.
const TRANSPARENT: u16 = 256;

#[derive(Error, Debug)]
pub enum UnoptimizeError {
	#[error("stream has no images")]
	Empty,
	#[error("stream has no global colormap")]
	NoGlobalColormap,
	#[error("image {0} has a local colormap; unoptimize requires a single shared colormap")]
	LocalColormapPresent(usize),
	#[error("ran out of unused colors while unoptimizing; need a free slot for transparency")]
	NoFreeColorForTransparency,
}

/// Whether to additionally compute the simplest disposal method each unoptimized frame can
/// get away with, rather than leaving every frame `Disposal::Background`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnoptimizeFlags {
	pub simplest_disposal: bool,
}

/// Expands every image in `stream` to the full screen size, replacing inter-frame diffs and
/// disposal tricks with literal pixels (using a reserved, possibly newly-allocated colour
/// table slot for transparency).
pub fn unoptimize(stream: &mut Stream, flags: UnoptimizeFlags) -> Result<(), UnoptimizeError> {
	if stream.is_empty() {
		return Ok(());
	}
	if stream.images.iter().any(|img| img.local_colormap.is_some()) {
		let index = stream.images.iter().position(|img| img.local_colormap.is_some()).unwrap();
		return Err(UnoptimizeError::LocalColormapPresent(index));
	}
	if stream.global_colormap.is_none() {
		return Err(UnoptimizeError::NoGlobalColormap);
	}

	let screen_width = stream.screen_width as usize;
	let screen_height = stream.screen_height as usize;
	let size = screen_width * screen_height;

	let background_color = {
		let first = &stream.images[0];
		let global_len = stream.global_colormap.as_ref().unwrap().len();
		if first.transparent.is_none() && (stream.background.unwrap_or(255) as usize) < global_len {
			stream.background.unwrap() as u16
		} else {
			TRANSPARENT
		}
	};

	let mut screen = vec![background_color; size];

	for i in 0..stream.images.len() {
		unoptimize_image(stream, i, &mut screen, screen_width, screen_height)?;
	}

	if flags.simplest_disposal {
		let n = stream.images.len();
		for i in 0..n {
			let disposal = if i == n - 1 || no_more_transparency(&stream.images[i + 1], &stream.images[i]) {
				Disposal::None
			} else {
				Disposal::Background
			};
			stream.images[i].disposal = disposal;
		}
	} else {
		for image in &mut stream.images {
			image.disposal = Disposal::Background;
		}
	}

	Ok(())
}

fn unoptimize_image(
	stream: &mut Stream,
	index: usize,
	screen: &mut [u16],
	screen_width: usize,
	screen_height: usize,
) -> Result<(), UnoptimizeError> {
	let disposal = stream.images[index].disposal;

	let mut working_screen = if disposal == Disposal::Previous {
		screen.to_vec()
	} else {
		Vec::new()
	};
	let target_screen: &mut [u16] = if disposal == Disposal::Previous { &mut working_screen } else { screen };

	put_image_in_screen(&stream.images[index], target_screen, screen_width, screen_height);

	let (new_data, transparent) = create_image_data(target_screen)?;

	if let Some(transparent) = transparent {
		let global = stream.global_colormap.as_mut().unwrap();
		while global.len() <= transparent {
			global.push(crate::model::Color::BLACK);
		}
	}

	if disposal == Disposal::Background {
		let image_snapshot = stream.images[index].clone();
		put_background_in_screen(stream, &image_snapshot, screen, screen_width, screen_height);
	}
	// Disposal::Previous leaves `screen` untouched; the scratch `working_screen` is discarded.

	let image = &mut stream.images[index];
	image.left = 0;
	image.top = 0;
	image.width = screen_width as u16;
	image.height = screen_height as u16;
	// Overwritten below once every image has been unoptimized (either simplest-disposal
	// analysis or a flat GIF_DISPOSAL_BACKGROUND for every frame).
	image.disposal = Disposal::None;
	image.transparent = transparent.map(|t| t as u8);
	image.data = ImageData::Uncompressed(new_data);

	Ok(())
}

fn put_image_in_screen(image: &Image, screen: &mut [u16], screen_width: usize, screen_height: usize) {
	let w = (image.width as usize).min(screen_width.saturating_sub(image.left as usize));
	let h = (image.height as usize).min(screen_height.saturating_sub(image.top as usize));
	let Some(pixels) = image.pixels() else { return };

	for y in 0..h {
		let src_row = &pixels[y * image.width as usize..y * image.width as usize + w.min(image.width as usize)];
		let dst_start = screen_width * (y + image.top as usize) + image.left as usize;
		for (x, &p) in src_row.iter().enumerate() {
			if image.transparent != Some(p) {
				screen[dst_start + x] = p as u16;
			}
		}
	}
}

fn put_background_in_screen(stream: &Stream, image: &Image, screen: &mut [u16], screen_width: usize, screen_height: usize) {
	let w = (image.width as usize).min(screen_width.saturating_sub(image.left as usize));
	let h = (image.height as usize).min(screen_height.saturating_sub(image.top as usize));

	let global_len = stream.global_colormap.as_ref().map(Colormap::len).unwrap_or(0);
	let first_transparent = stream.images.first().and_then(|img| img.transparent);
	let solid = if image.transparent.is_none()
		&& first_transparent.is_none()
		&& (stream.background.unwrap_or(255) as usize) < global_len
	{
		stream.background.unwrap() as u16
	} else {
		TRANSPARENT
	};

	for y in 0..h {
		let dst_start = screen_width * (y + image.top as usize) + image.left as usize;
		for x in 0..w {
			screen[dst_start + x] = solid;
		}
	}
}

/// Builds the final pixel data for one unoptimized frame from `screen`, allocating a fresh
/// transparent colour index if the screen used the `TRANSPARENT` sentinel anywhere.
fn create_image_data(screen: &[u16]) -> Result<(Vec<u8>, Option<usize>), UnoptimizeError> {
	let mut have = [false; 257];
	for &v in screen {
		have[v as usize] = true;
	}

	let transparent = if have[TRANSPARENT as usize] {
		match (0..256).find(|&i| !have[i]) {
			Some(slot) => Some(slot),
			None => return Err(UnoptimizeError::NoFreeColorForTransparency),
		}
	} else {
		None
	};

	let mut data = Vec::with_capacity(screen.len());
	for &v in screen {
		data.push(if v == TRANSPARENT { transparent.unwrap() as u8 } else { v as u8 });
	}

	Ok((data, transparent))
}

/// True if frame `gfi1` has no transparent pixel that isn't also transparent at the same
/// position in `gfi2` - i.e. disposing `gfi1` down to `gfi2` wouldn't reveal anything `gfi2`
/// didn't already intend to show through.
fn no_more_transparency(gfi1: &Image, gfi2: &Image) -> bool {
	let Some(t1) = gfi1.transparent else { return true };
	let t2 = gfi2.transparent;
	let (Some(p1), Some(p2)) = (gfi1.pixels(), gfi2.pixels()) else { return true };
	for (a, b) in p1.iter().zip(p2.iter()) {
		if *a == t1 && Some(*b) != t2 {
			return false;
		}
	}
	true
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::Color;

	fn solid_stream() -> Stream {
		let mut stream = Stream::new();
		stream.screen_width = 2;
		stream.screen_height = 2;
		let mut cmap = Colormap::with_capacity(4);
		for i in 0..4 {
			cmap.push(Color::new(i as u8 * 50, 0, 0));
		}
		stream.global_colormap = Some(cmap);
		stream.background = Some(0);

		let mut first = Image::new(0, 0, 2, 2);
		if let Some(pixels) = first.pixels_mut() {
			pixels.copy_from_slice(&[1, 1, 1, 1]);
		}
		stream.add_image(first);

		let mut second = Image::new(1, 1, 1, 1);
		second.disposal = Disposal::Background;
		if let Some(pixels) = second.pixels_mut() {
			pixels[0] = 2;
		}
		stream.add_image(second);

		stream
	}

	#[test]
	fn unoptimized_frames_fill_the_whole_screen() {
		let mut stream = solid_stream();
		unoptimize(&mut stream, UnoptimizeFlags::default()).unwrap();

		for image in &stream.images {
			assert_eq!(stream.screen_width, image.width);
			assert_eq!(stream.screen_height, image.height);
			assert_eq!(0, image.left);
			assert_eq!(0, image.top);
		}
	}

	#[test]
	fn rejects_local_colormaps() {
		let mut stream = solid_stream();
		stream.images[0].local_colormap = Some(Colormap::new());
		let result = unoptimize(&mut stream, UnoptimizeFlags::default());
		assert!(matches!(result, Err(UnoptimizeError::LocalColormapPresent(0))));
	}
}
