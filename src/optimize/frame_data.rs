//! Turns each [`Subimage`] plus the [`Assignment`] decision for its colours into the stream's
//! final, optimized image list.

use std::collections::HashMap;

use crate::io::GrowingSink;
use crate::lzw;
use crate::model::{Color, Colormap, Disposal, Image, ImageData, Stream};

use super::colormap::Assignment;
use super::subimage::Subimage;
use super::OptimizeFlags;

pub fn finish(stream: &mut Stream, subimages: Vec<Subimage>, assignment: Assignment, flags: OptimizeFlags) {
	let screen_width = stream.screen_width as usize;
	// Phase O-1 step 6: the first frame only gets transparency when the background itself was
	// transparent; later frames get it whenever optimize_level >= 2. Approximated here by
	// whether the stream's original first frame already carried a transparent index, since this
	// crate's model doesn't track a separate TRANSP background sentinel.
	let background_transparent = stream.images.first().map(|image| image.transparent.is_some()).unwrap_or(false);

	let new_images: Vec<Image> = stream
		.images
		.iter()
		.zip(subimages.iter())
		.zip(assignment.uses_global.iter())
		.enumerate()
		.map(|(i, ((image, subimage), &uses_global))| {
			if !uses_global {
				log::debug!("frame {}: colours don't all fit the shared table, using a local colormap", i);
			}
			let colormap = stream.active_colormap(image).cloned();
			let transparency_allowed = if i == 0 { background_transparent } else { flags.level >= 2 };
			build_image(image, subimage, &assignment, !uses_global, colormap, screen_width, flags.level, transparency_allowed)
		})
		.collect();

	stream.global_colormap = Some(assignment.global_colormap);
	stream.images = new_images;

	if !flags.keep_empty_frames {
		drop_redundant_transparent_frames(stream);
	}

	// Prefer `Disposal::None` to `Disposal::Asis`: semantically equivalent, but lets the
	// writer skip the graphic control extension in more cases.
	for image in &mut stream.images {
		if image.disposal == Disposal::Asis && image.delay == 0 && image.transparent.is_none() {
			image.disposal = Disposal::None;
		}
	}
}

/// Builds one optimized image: its pixels come from re-sampling `image` at each screen
/// position the subimage's bounds cover. Pixels [`Subimage::transparent_candidates`] marks as
/// redundant are candidates for painting over with a transparent index instead of their literal
/// colour; whether that actually happens, and how, is Phase O-4's job - see
/// [`render_candidate`] and [`substitution_mask`].
fn build_image(
	image: &Image,
	subimage: &Subimage,
	assignment: &Assignment,
	needs_local: bool,
	source_colormap: Option<Colormap>,
	screen_width: usize,
	level: u8,
	transparency_allowed: bool,
) -> Image {
	let left = subimage.left;
	let top = subimage.top;
	let width = subimage.width;
	let height = subimage.height;

	let mut intrinsic = Vec::with_capacity(width as usize * height as usize);
	let mut redundant = Vec::with_capacity(width as usize * height as usize);
	for y in 0..height as usize {
		for x in 0..width as usize {
			let screen_x = left as usize + x;
			let screen_y = top as usize + y;
			intrinsic.push(pixel_color_at(image, screen_x, screen_y, &source_colormap));
			let wide_idx = screen_y * screen_width + screen_x;
			redundant.push(subimage.transparent_candidates.get(wide_idx).copied().unwrap_or(false));
		}
	}
	// A pixel is only a substitution candidate if it's both redundant (matches what's already
	// on screen) and would otherwise be drawn as a real colour - a pixel the source image itself
	// left transparent is already going to end up transparent regardless.
	let eligible: Vec<bool> = intrinsic.iter().zip(redundant.iter()).map(|(c, &r)| r && c.is_some()).collect();

	let no_substitution = vec![false; eligible.len()];
	let simple = render_candidate(&intrinsic, &no_substitution, needs_local, assignment, width, height, left, top);

	let mut result = if !transparency_allowed {
		simple
	} else {
		let runs = substitution_mask(&eligible, false);
		let transparent = render_candidate(&intrinsic, &runs, needs_local, assignment, width, height, left, top);
		let mut best = pick_smaller(simple, transparent, assignment);

		if level >= 3 {
			let all = substitution_mask(&eligible, true);
			let transparent_all = render_candidate(&intrinsic, &all, needs_local, assignment, width, height, left, top);
			best = pick_smaller(best, transparent_all, assignment);
		}

		best
	};

	result.disposal = subimage.disposal;
	result.delay = image.delay;
	result.interlace = image.interlace;
	result.identifier = image.identifier.clone();
	result.comment = image.comment.clone();
	result
}

/// Decides which eligible pixels actually get substituted with transparency: an isolated single
/// eligible pixel is left at its literal colour (substituting it gains one shorter run at the
/// cost of breaking up the run it sits inside), while a run of two or more adjacent eligible
/// pixels is worth joining into one transparent run. `include_singles` (the level-3 extra trial)
/// overrides this and substitutes every eligible pixel regardless of run length.
fn substitution_mask(eligible: &[bool], include_singles: bool) -> Vec<bool> {
	let mut mask = vec![false; eligible.len()];
	let mut i = 0;
	while i < eligible.len() {
		if !eligible[i] {
			i += 1;
			continue;
		}
		let start = i;
		while i < eligible.len() && eligible[i] {
			i += 1;
		}
		if include_singles || i - start >= 2 {
			mask[start..i].fill(true);
		}
	}
	mask
}

/// Renders one candidate frame: `substitute[i]` (or the source pixel already being transparent)
/// paints over position `i` with a shared transparent index; everything else gets its literal
/// colour's slot in whichever colour table this image ends up using.
fn render_candidate(
	intrinsic: &[Option<Color>],
	substitute: &[bool],
	needs_local: bool,
	assignment: &Assignment,
	width: u16,
	height: u16,
	left: u16,
	top: u16,
) -> Image {
	let mut local = needs_local.then(Colormap::new);
	let mut local_slot_for_color: HashMap<Color, usize> = HashMap::new();
	let mut transparent_index: Option<u8> = None;

	let mut pixels = vec![0u8; width as usize * height as usize];
	for (i, pixel) in pixels.iter_mut().enumerate() {
		let out_index = match intrinsic[i].filter(|_| !substitute[i]) {
			Some(color) => {
				if needs_local {
					*local_slot_for_color
						.entry(color)
						.or_insert_with(|| local.as_mut().unwrap().push(color).unwrap_or(0))
				} else {
					*assignment.global_slot_for_color.get(&color).unwrap_or(&0)
				}
			}
			None => *transparent_index.get_or_insert_with(|| allocate_transparent_slot(assignment, local.as_mut(), needs_local)) as usize,
		};
		*pixel = out_index as u8;
	}

	let mut result = Image::new(left, top, width, height);
	result.local_colormap = local;
	result.transparent = transparent_index;
	result.data = ImageData::Uncompressed(pixels);
	result
}

/// Compresses `image`'s pixels with the min-code-size its colour table implies, returning the
/// encoded byte count - the `SHRINK` comparison's metric for "smaller".
fn encoded_size(image: &Image, assignment: &Assignment) -> usize {
	let min_code_bits = image.local_colormap.as_ref().map(Colormap::min_code_bits).unwrap_or_else(|| assignment.global_colormap.min_code_bits());
	let pixels = image.pixels().expect("candidate frames are always built as uncompressed pixels");
	let mut sink = GrowingSink::new();
	lzw::encode(&mut sink, pixels, min_code_bits).expect("encoding into an in-memory buffer cannot fail");
	sink.buffer.len()
}

fn pick_smaller(a: Image, b: Image, assignment: &Assignment) -> Image {
	if encoded_size(&b, assignment) < encoded_size(&a, assignment) {
		b
	} else {
		a
	}
}

fn pixel_color_at(image: &Image, screen_x: usize, screen_y: usize, colormap: &Option<Colormap>) -> Option<Color> {
	if screen_x < image.left as usize
		|| screen_y < image.top as usize
		|| screen_x >= image.left as usize + image.width as usize
		|| screen_y >= image.top as usize + image.height as usize
	{
		return None;
	}
	let local_x = screen_x - image.left as usize;
	let local_y = screen_y - image.top as usize;
	let pixels = image.pixels()?;
	let p = pixels[local_y * image.width as usize + local_x];
	if image.transparent == Some(p) {
		return None;
	}
	colormap.as_ref().and_then(|cm| cm.get(p as usize)).copied()
}

/// Finds (or creates) a colour-table slot that can stand in for transparency: a black entry
/// appended to whichever table (`local`, or the shared global table) this image is using,
/// reusing an existing black entry if there's already one free.
fn allocate_transparent_slot(assignment: &Assignment, local: Option<&mut Colormap>, needs_local: bool) -> u8 {
	if needs_local {
		let cm = local.unwrap();
		cm.find_color(Color::BLACK).unwrap_or_else(|| cm.push(Color::BLACK).unwrap_or(0)) as u8
	} else {
		assignment.global_colormap.find_color(Color::BLACK).unwrap_or(0) as u8
	}
}

/// Drops single-pixel, fully-transparent frames that exist only to pad timing, folding their
/// delay into the previous frame instead (mirrors the reference optimizer's cleanup pass).
fn drop_redundant_transparent_frames(stream: &mut Stream) {
	let mut i = 1;
	while i < stream.images.len() {
		let is_padding = {
			let img = &stream.images[i];
			img.width == 1
				&& img.height == 1
				&& img.transparent.is_some()
				&& img.identifier.is_none()
				&& img.comment.is_none()
				&& matches!(img.disposal, Disposal::Asis | Disposal::None | Disposal::Previous)
				&& img.delay != 0
				&& stream.images[i - 1].delay != 0
				&& img.pixels().map(|p| p[0] == img.transparent.unwrap()).unwrap_or(false)
		};
		if is_padding {
			let delay = stream.images[i].delay;
			stream.images[i - 1].delay += delay;
			stream.images.remove(i);
		} else {
			i += 1;
		}
	}
}
