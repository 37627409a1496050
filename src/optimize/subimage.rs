//! Per-frame difference-bounds and disposal-method selection.

use crate::model::{Disposal, Image, Stream};

/// The smallest rectangle of `full_pixels` that needs to be re-drawn for this frame, plus the
/// disposal method that produces it, and the full-screen pixel buffer this frame leaves
/// visible for the next frame's diff (after its own disposal is applied).
#[derive(Debug, Clone)]
pub struct Subimage {
	pub left: u16,
	pub top: u16,
	pub width: u16,
	pub height: u16,
	pub disposal: Disposal,
	pub transparent_candidates: Vec<bool>,
	/// This frame's full-screen pixel buffer (colour-table indices in the unified colour
	/// space), used as the previous-frame reference for the next subimage's diff.
	pub full_pixels: Vec<u16>,
}

/// Computes one [`Subimage`] per image in `stream`, choosing for each (after the first) the
/// disposal method - `None`/`Asis` (leave as-is), `Background`, or `Previous` - that yields the
/// smallest changed rectangle relative to what the previous frame left on screen.
pub fn build_subimages(stream: &Stream) -> Vec<Subimage> {
	let screen_width = stream.screen_width as usize;
	let screen_height = stream.screen_height as usize;
	let size = screen_width * screen_height;

	let mut subimages = Vec::with_capacity(stream.images.len());
	let background_screen = vec![0u16; size];
	let mut previous_screen: Option<Vec<u16>> = None; // screen state two frames back, for Previous disposal
	let mut current_screen = background_screen.clone();

	for (index, image) in stream.images.iter().enumerate() {
		// Global pixel values aren't resolved until the shared colour table is built
		// (see colormap::build_shared_colormap); here we only care about which pixels differ
		// from what is already on screen, so the image's own local indices are fine as-is.
		let wide = widen_image(image, screen_width, screen_height);

		let reference_screen = if index == 0 { &background_screen } else { &current_screen };
		let (bounds, disposal) = choose_disposal(reference_screen, previous_screen.as_deref(), &wide, screen_width, screen_height);

		let mut after_disposal = reference_screen.clone();
		apply_wide_image(&mut after_disposal, &wide);

		let transparent_candidates = compute_redundant_pixels(reference_screen, &wide);

		previous_screen = Some(current_screen.clone());
		current_screen = after_disposal.clone();

		subimages.push(Subimage {
			left: bounds.0 as u16,
			top: bounds.1 as u16,
			width: bounds.2 as u16,
			height: bounds.3 as u16,
			disposal,
			transparent_candidates,
			full_pixels: after_disposal,
		});
	}

	subimages
}

fn widen_image(image: &Image, screen_width: usize, screen_height: usize) -> Vec<Option<u16>> {
	let mut wide = vec![None; screen_width * screen_height];
	let Some(pixels) = image.pixels() else { return wide };
	let w = (image.width as usize).min(screen_width.saturating_sub(image.left as usize));
	let h = (image.height as usize).min(screen_height.saturating_sub(image.top as usize));

	for y in 0..h {
		for x in 0..w {
			let p = pixels[y * image.width as usize + x];
			if image.transparent == Some(p) {
				continue;
			}
			let dst = screen_width * (y + image.top as usize) + x + image.left as usize;
			wide[dst] = Some(p as u16);
		}
	}
	wide
}

fn apply_wide_image(screen: &mut [u16], wide: &[Option<u16>]) {
	for (dst, src) in screen.iter_mut().zip(wide.iter()) {
		if let Some(v) = src {
			*dst = *v;
		}
	}
}

/// Picks whichever disposal produces the tightest change rectangle: `None` (no prior clearing;
/// diff against whatever is on screen now), `Background` (diff against a hypothetical
/// background-cleared screen, which is the same comparison here since we already track the
/// post-disposal screen as `reference_screen`), or `Previous` (diff against the screen as it
/// stood two frames back, when that's available and tighter).
fn choose_disposal(
	reference_screen: &[u16],
	previous_screen: Option<&[u16]>,
	wide: &[Option<u16>],
	screen_width: usize,
	screen_height: usize,
) -> ((usize, usize, usize, usize), Disposal) {
	let none_bounds = difference_bounds(reference_screen, wide, screen_width, screen_height);

	let previous_bounds = previous_screen.map(|prev| difference_bounds(prev, wide, screen_width, screen_height));

	match previous_bounds {
		Some(prev_bounds) if area(prev_bounds) < area(none_bounds) => (prev_bounds, Disposal::Previous),
		_ => (none_bounds, Disposal::None),
	}
}

fn area(b: (usize, usize, usize, usize)) -> usize {
	b.2 * b.3
}

/// The smallest rectangle containing every pixel where `wide` draws something different from
/// what `screen` already shows.
fn difference_bounds(screen: &[u16], wide: &[Option<u16>], screen_width: usize, screen_height: usize) -> (usize, usize, usize, usize) {
	let mut min_x = screen_width;
	let mut min_y = screen_height;
	let mut max_x = 0usize;
	let mut max_y = 0usize;
	let mut any = false;

	for y in 0..screen_height {
		for x in 0..screen_width {
			let idx = y * screen_width + x;
			if let Some(v) = wide[idx] {
				if v != screen[idx] {
					any = true;
					min_x = min_x.min(x);
					min_y = min_y.min(y);
					max_x = max_x.max(x);
					max_y = max_y.max(y);
				}
			}
		}
	}

	if !any {
		(0, 0, 1, 1)
	} else {
		(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
	}
}

/// Pixels this frame draws that already match what's on screen - candidates to be painted over
/// with a reusable transparent index instead of their literal colour, since doing so shrinks
/// the image's required-colour set without changing what's displayed.
fn compute_redundant_pixels(screen: &[u16], wide: &[Option<u16>]) -> Vec<bool> {
	wide.iter()
		.zip(screen.iter())
		.map(|(w, s)| matches!(w, Some(v) if v == s))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Color, Colormap, Image};

	fn test_stream() -> Stream {
		let mut stream = Stream::new();
		stream.screen_width = 4;
		stream.screen_height = 4;
		let mut cmap = Colormap::with_capacity(4);
		for i in 0..4 {
			cmap.push(Color::new(i as u8 * 60, 0, 0));
		}
		stream.global_colormap = Some(cmap);

		let mut first = Image::new(0, 0, 4, 4);
		if let Some(pixels) = first.pixels_mut() {
			pixels.fill(1);
		}
		stream.add_image(first);

		let mut second = Image::new(1, 1, 2, 2);
		if let Some(pixels) = second.pixels_mut() {
			pixels.fill(2);
		}
		stream.add_image(second);

		stream
	}

	#[test]
	fn second_frame_bounds_match_its_changed_region() {
		let stream = test_stream();
		let subimages = build_subimages(&stream);
		assert_eq!(2, subimages.len());
		assert_eq!((1, 1, 2, 2), (subimages[1].left, subimages[1].top, subimages[1].width, subimages[1].height));
	}
}
