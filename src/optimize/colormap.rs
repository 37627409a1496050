//! Building one shared colour table across every optimized frame.
//!
//! Every colour actually used anywhere in the stream is gathered into a single "all colors"
//! table; if there are 256 or fewer of them (256 minus one reserved transparent slot), they
//! all fit directly into the output global colour table. Past that, colours are ranked by how
//! many frames require them and the least-needed ones are dropped to a per-frame local colour
//! table instead - a simplified stand-in for the reference optimizer's iterative
//! penalty/permutation search, which converges on the same idea (keep what's needed broadly,
//! push what's rare into local tables) without the full tree-structured cost model.

use std::collections::{HashMap, HashSet};

use crate::model::{Color, Colormap, Stream};

use super::subimage::Subimage;

/// Per-image decision: whether all of its required colours fit in the shared global table.
pub struct Assignment {
	pub global_colormap: Colormap,
	/// Where each colour that made it into `global_colormap` lives.
	pub global_slot_for_color: HashMap<Color, usize>,
	/// `true` for images whose every required colour is in `global_slot_for_color`; `false`
	/// for images that need their own local colour table instead.
	pub uses_global: Vec<bool>,
}

/// Builds the unified colour table across every frame and decides how many of its entries can
/// live in one shared global colour table (at most 256, with one slot reserved for
/// transparency if any frame uses it).
pub fn build_shared_colormap(stream: &Stream, subimages: &[Subimage]) -> Assignment {
	let mut use_count: HashMap<Color, u32> = HashMap::new();
	let mut per_image_colors: Vec<HashSet<Color>> = Vec::with_capacity(stream.images.len());

	let screen_width = stream.screen_width as usize;

	for (image, subimage) in stream.images.iter().zip(subimages) {
		let mut used = HashSet::new();
		if let Some(colormap) = stream.active_colormap(image) {
			if let Some(pixels) = image.pixels() {
				let width = image.width as usize;
				let height = image.height as usize;
				for y in 0..height {
					for x in 0..width {
						let p = pixels[y * width + x];
						if image.transparent == Some(p) {
							continue;
						}
						let wide_idx = (image.top as usize + y) * screen_width + (image.left as usize + x);
						let redundant = subimage.transparent_candidates.get(wide_idx).copied().unwrap_or(false);
						if let Some(&color) = colormap.get(p as usize) {
							// A redundant pixel might still end up drawn at its literal colour -
							// frame_data's simple-vs-transparent comparison decides per frame - so
							// it always counts as used, but carries no ranking weight below, since
							// it's the pixel least likely to survive that comparison.
							used.insert(color);
							if !redundant {
								*use_count.entry(color).or_insert(0) += 1;
							} else {
								use_count.entry(color).or_insert(0);
							}
						}
					}
				}
			}
		}
		per_image_colors.push(used);
	}

	let any_transparent = stream.images.iter().any(|i| i.transparent.is_some());
	let budget = if any_transparent { 255 } else { 256 };

	let mut ranked: Vec<Color> = use_count.keys().copied().collect();
	ranked.sort_by(|a, b| use_count[b].cmp(&use_count[a]));
	let kept: HashSet<Color> = ranked.into_iter().take(budget).collect();

	let mut global_colormap = Colormap::new();
	if any_transparent {
		global_colormap.push(Color::BLACK);
	}
	let mut global_slot_for_color = HashMap::new();
	for &color in &kept {
		let slot = global_colormap.push(color).expect("budget enforced above");
		global_slot_for_color.insert(color, slot);
	}

	let uses_global = per_image_colors
		.iter()
		.map(|colors| colors.iter().all(|c| global_slot_for_color.contains_key(c)))
		.collect();

	Assignment { global_colormap, global_slot_for_color, uses_global }
}
