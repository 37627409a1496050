//! Per-frame geometric and colour transforms: crop, flip, rotate, fixed-point nearest-neighbor
//! resize, and a pluggable colour-table transform pipeline.

use crate::model::{Color, Colormap, Image, ImageData, Stream};

const SCALE_SHIFT: i64 = 10;
const SCALE_FACTOR: i64 = 1 << SCALE_SHIFT;

fn scale(v: i64) -> i64 {
	v << SCALE_SHIFT
}

fn unscale(v: i64) -> i64 {
	v >> SCALE_SHIFT
}

/// A crop rectangle in screen coordinates, plus the offset its new top-left corner should be
/// expressed relative to (used when several images in a stream are cropped to the same box and
/// should come out with consistent `left`/`top` values).
#[derive(Debug, Clone, Copy)]
pub struct Crop {
	pub x: i32,
	pub y: i32,
	pub w: i32,
	pub h: i32,
	pub left_offset: i32,
	pub top_offset: i32,
	pub transparent_edges: bool,
}

/// Crops `image` in place to whatever part of `crop` overlaps it, trimming any further
/// fully-transparent border first if `crop.transparent_edges` is set. Returns `false` if nothing
/// of `crop` overlaps the image, leaving it empty - unless `first_image` is set, in which case an
/// otherwise-vanishing image is instead reduced to a single pixel taken from its own corner, since
/// a stream's first frame may never disappear entirely.
pub fn crop_image(image: &mut Image, crop: &Crop, first_image: bool) -> bool {
	let mut x = crop.x - image.left as i32;
	let mut y = crop.y - image.top as i32;
	let mut w = crop.w;
	let mut h = crop.h;

	if x < 0 {
		w += x;
		x = 0;
	}
	if y < 0 {
		h += y;
		y = 0;
	}
	if x + w > image.width as i32 {
		w = image.width as i32 - x;
	}
	if y + h > image.height as i32 {
		h = image.height as i32 - y;
	}

	if w > 0 && h > 0 && crop.transparent_edges {
		if let (Some(transparent), Some(pixels)) = (image.transparent, image.pixels()) {
			trim_transparent_edges(pixels, image.width as usize, transparent, &mut x, &mut y, &mut w, &mut h);
		}
	}

	let Some(pixels) = image.pixels() else { return false };
	let src_width = image.width as usize;

	if w > 0 && h > 0 {
		let mut cropped = Vec::with_capacity(w as usize * h as usize);
		for row in 0..h {
			let start = (y + row) as usize * src_width + x as usize;
			cropped.extend_from_slice(&pixels[start..start + w as usize]);
		}
		image.left = (image.left as i32 + x - crop.left_offset) as u16;
		image.top = (image.top as i32 + y - crop.top_offset) as u16;
		image.width = w as u16;
		image.height = h as u16;
		image.data = ImageData::Uncompressed(cropped);
		true
	} else if first_image {
		let corner = pixels[0];
		image.width = 1;
		image.height = 1;
		image.transparent = Some(corner);
		image.data = ImageData::Uncompressed(vec![corner]);
		true
	} else {
		image.width = 0;
		image.height = 0;
		image.data = ImageData::Uncompressed(Vec::new());
		false
	}
}

/// Shrinks the `(x, y, w, h)` crop box (in place) past any border rows/columns that are entirely
/// `transparent`, left/top/right/bottom in turn.
fn trim_transparent_edges(pixels: &[u8], width: usize, transparent: u8, x: &mut i32, y: &mut i32, w: &mut i32, h: &mut i32) {
	let at = |px: i32, py: i32| pixels[py as usize * width + px as usize];

	while *w > 0 && (*y..*y + *h).all(|j| at(*x, j) == transparent) {
		*x += 1;
		*w -= 1;
	}
	while *h > 0 && (*x..*x + *w).all(|j| at(j, *y) == transparent) {
		*y += 1;
		*h -= 1;
	}
	while *w > 0 && (*y..*y + *h).all(|j| at(*x + *w - 1, j) == transparent) {
		*w -= 1;
	}
	while *h > 0 && (*x..*x + *w).all(|j| at(j, *y + *h - 1) == transparent) {
		*h -= 1;
	}
}

/// Flips `image` left-to-right in place, re-expressing its `left` offset relative to
/// `screen_width` so it stays anchored to the same edge of the screen it started on.
pub fn flip_image_horizontal(image: &mut Image, screen_width: u16) {
	let width = image.width as usize;
	if let Some(pixels) = image.pixels() {
		let mut flipped = Vec::with_capacity(pixels.len());
		for row in pixels.chunks(width) {
			flipped.extend(row.iter().rev());
		}
		image.data = ImageData::Uncompressed(flipped);
	}
	image.left = screen_width - (image.left + image.width);
}

/// Flips `image` top-to-bottom in place, re-expressing its `top` offset relative to
/// `screen_height`.
pub fn flip_image_vertical(image: &mut Image, screen_height: u16) {
	let width = image.width as usize;
	if let Some(pixels) = image.pixels() {
		let flipped: Vec<u8> = pixels.rchunks(width).flatten().copied().collect();
		image.data = ImageData::Uncompressed(flipped);
	}
	image.top = screen_height - (image.top + image.height);
}

/// A whole-multiple-of-90-degrees rotation. `Half180` is implemented as a horizontal flip
/// followed by a vertical one, which has the same effect without needing its own pixel shuffle.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Rotation {
	Clockwise90,
	Half180,
	CounterClockwise90,
}

/// Rotates `image` in place by `rotation`, swapping its width and height (for the 90-degree
/// cases) and re-expressing `left`/`top` relative to the screen dimensions it's rotating within.
/// Callers rotating a stream's very first frame should grow the stream's own screen size to match
/// (width and height swap places) if no explicit output size was requested - see `rotate_90`'s
/// screen-size handling in the reference tool.
pub fn rotate_image(image: &mut Image, screen_width: u16, screen_height: u16, rotation: Rotation) {
	match rotation {
		Rotation::Half180 => {
			flip_image_horizontal(image, screen_width);
			flip_image_vertical(image, screen_height);
		}
		Rotation::Clockwise90 => rotate_90(image, screen_width, screen_height, true),
		Rotation::CounterClockwise90 => rotate_90(image, screen_width, screen_height, false),
	}
}

fn rotate_90(image: &mut Image, screen_width: u16, screen_height: u16, clockwise: bool) {
	let width = image.width as usize;
	let height = image.height as usize;
	let Some(pixels) = image.pixels() else { return };

	let mut new_data = Vec::with_capacity(width * height);
	if clockwise {
		for x in 0..width {
			for y in (0..height).rev() {
				new_data.push(pixels[y * width + x]);
			}
		}
	} else {
		for x in (0..width).rev() {
			for y in 0..height {
				new_data.push(pixels[y * width + x]);
			}
		}
	}

	let (old_left, old_top) = (image.left, image.top);
	if clockwise {
		image.left = screen_height - (old_top + image.height);
		image.top = old_left;
	} else {
		image.top = screen_width - (old_left + image.width);
		image.left = old_top;
	}

	image.width = height as u16;
	image.height = width as u16;
	image.data = ImageData::Uncompressed(new_data);
}

/// Resamples `image` in place by `xfactor`/`yfactor`, using fixed-point (10-bit) arithmetic
/// throughout so that frames sharing a screen scale consistently instead of drifting apart from
/// independent rounding. The new width/height are derived from the scaled left/top/right/bottom
/// edges rather than from `width * xfactor` directly, for the same reason.
pub fn scale_image(image: &mut Image, xfactor: f64, yfactor: f64) {
	let scaled_xstep = (SCALE_FACTOR as f64 * xfactor + 0.5) as i64;
	let scaled_ystep = (SCALE_FACTOR as f64 * yfactor + 0.5) as i64;

	let left = image.left as i64;
	let top = image.top as i64;
	let width = image.width as i64;
	let height = image.height as i64;

	let new_left = unscale(scaled_xstep * left);
	let new_top = unscale(scaled_ystep * top);
	let new_right = unscale(scaled_xstep * (left + width));
	let new_bottom = unscale(scaled_ystep * (top + height));

	let new_width = (new_right - new_left).max(1);
	let new_height = (new_bottom - new_top).max(1);

	let Some(pixels) = image.pixels().map(<[u8]>::to_vec) else { return };
	let mut new_data = vec![0u8; (new_width * new_height) as usize];

	let mut new_y = new_top;
	let mut scaled_new_y = scaled_ystep * top;

	for j in 0..height {
		let in_row = &pixels[(j * width) as usize..((j + 1) * width) as usize];

		scaled_new_y += scaled_ystep;
		if j == height - 1 {
			scaled_new_y = scale(new_bottom);
		}
		if scaled_new_y < scale(new_y + 1) {
			continue;
		}
		let y_delta = unscale(scaled_new_y - scale(new_y));

		let mut new_x = new_left;
		let mut scaled_new_x = scaled_xstep * left;
		let mut out_offset = ((new_y - new_top) * new_width + (new_x - new_left)) as usize;

		for i in 0..width {
			scaled_new_x += scaled_xstep;
			if i == width - 1 {
				scaled_new_x = scale(new_right);
			}
			let mut x_delta = unscale(scaled_new_x - scale(new_x));

			while x_delta > 0 {
				for yinc in 0..y_delta {
					new_data[out_offset + (yinc * new_width) as usize] = in_row[i as usize];
				}
				new_x += 1;
				x_delta -= 1;
				out_offset += 1;
			}
		}

		new_y += y_delta;
	}

	image.width = new_width as u16;
	image.height = new_height as u16;
	image.left = new_left as u16;
	image.top = new_top as u16;
	image.data = ImageData::Uncompressed(new_data);
}

/// Scales every image in `stream` to fit a new screen of `new_width` x `new_height` (either may
/// be zero or negative to mean "keep the stream's existing aspect ratio").
pub fn resize_stream(stream: &mut Stream, new_width: i32, new_height: i32) {
	let mut new_width = new_width;
	let mut new_height = new_height;
	if new_width <= 0 {
		new_width = ((stream.screen_width as f64 / stream.screen_height as f64) * new_height as f64) as i32;
	}
	if new_height <= 0 {
		new_height = ((stream.screen_height as f64 / stream.screen_width as f64) * new_width as f64) as i32;
	}

	let xfactor = new_width as f64 / stream.screen_width as f64;
	let yfactor = new_height as f64 / stream.screen_height as f64;

	for image in &mut stream.images {
		scale_image(image, xfactor, yfactor);
	}

	stream.screen_width = new_width as u16;
	stream.screen_height = new_height as u16;
}

/// A colour table transform: given a mutable colour table, rewrites it in place. Registered into
/// a [`ColorTransformPipeline`] and run against every colour table (global and per-image local)
/// in a stream. A caller wanting to pipe a colour table through an external process can plug one
/// in here; this crate does not spawn subprocesses itself.
pub type ColormapTransform = Box<dyn Fn(&mut Colormap)>;

/// One old-colour-to-new-colour substitution rule, matched by exact RGB equality.
#[derive(Debug, Clone, Copy)]
pub struct ColorChange {
	pub old: Color,
	pub new_color: Color,
}

/// An ordered list of colour-table transforms, applied to a stream's global colour table and
/// every image's local colour table, in registration order.
#[derive(Default)]
pub struct ColorTransformPipeline {
	transforms: Vec<ColormapTransform>,
}

impl ColorTransformPipeline {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, transform: ColormapTransform) {
		self.transforms.push(transform);
	}

	/// Appends a transform that rewrites every colour matching one of `changes` to its
	/// replacement, leaving everything else untouched.
	pub fn push_color_changes(&mut self, changes: Vec<ColorChange>) {
		self.push(Box::new(move |colormap: &mut Colormap| {
			for color in colormap.colors_mut() {
				if let Some(change) = changes.iter().find(|c| c.old == *color) {
					*color = change.new_color;
				}
			}
		}));
	}

	/// Runs every registered transform, in order, over `stream`'s global colour table (if any)
	/// and each image's local colour table (if any).
	pub fn apply(&self, stream: &mut Stream) {
		for transform in &self.transforms {
			if let Some(colormap) = &mut stream.global_colormap {
				transform(colormap);
			}
			for image in &mut stream.images {
				if let Some(colormap) = &mut image.local_colormap {
					transform(colormap);
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn image_with_pixels(left: u16, top: u16, width: u16, height: u16, pixels: &[u8]) -> Image {
		let mut image = Image::new(left, top, width, height);
		image.pixels_mut().unwrap().copy_from_slice(pixels);
		image
	}

	#[test]
	fn crop_trims_transparent_border() {
		#[rustfmt::skip]
		let mut image = image_with_pixels(0, 0, 4, 4, &[
			9, 9, 9, 9,
			9, 1, 2, 9,
			9, 3, 4, 9,
			9, 9, 9, 9,
		]);
		image.transparent = Some(9);
		let crop = Crop { x: 0, y: 0, w: 4, h: 4, left_offset: 0, top_offset: 0, transparent_edges: true };
		assert!(crop_image(&mut image, &crop, false));
		assert_eq!((1, 1, 2, 2), (image.left, image.top, image.width, image.height));
		assert_eq!(&[1, 2, 3, 4], image.pixels().unwrap());
	}

	#[test]
	fn crop_outside_bounds_empties_non_first_image() {
		let mut image = image_with_pixels(0, 0, 2, 2, &[1, 2, 3, 4]);
		let crop = Crop { x: 10, y: 10, w: 2, h: 2, left_offset: 0, top_offset: 0, transparent_edges: false };
		assert!(!crop_image(&mut image, &crop, false));
		assert_eq!(0, image.width);
	}

	#[test]
	fn crop_outside_bounds_keeps_first_image_as_one_pixel() {
		let mut image = image_with_pixels(0, 0, 2, 2, &[7, 2, 3, 4]);
		let crop = Crop { x: 10, y: 10, w: 2, h: 2, left_offset: 0, top_offset: 0, transparent_edges: false };
		assert!(crop_image(&mut image, &crop, true));
		assert_eq!((1, 1), (image.width, image.height));
		assert_eq!(Some(7), image.transparent);
	}

	#[test]
	fn flip_horizontal_reverses_rows_and_left() {
		let mut image = image_with_pixels(2, 0, 3, 2, &[1, 2, 3, 4, 5, 6]);
		flip_image_horizontal(&mut image, 10);
		assert_eq!(&[3, 2, 1, 6, 5, 4], image.pixels().unwrap());
		assert_eq!(5, image.left);
	}

	#[test]
	fn flip_vertical_reverses_row_order_and_top() {
		let mut image = image_with_pixels(0, 1, 2, 3, &[1, 2, 3, 4, 5, 6]);
		flip_image_vertical(&mut image, 10);
		assert_eq!(&[5, 6, 3, 4, 1, 2], image.pixels().unwrap());
		assert_eq!(6, image.top);
	}

	#[test]
	fn rotate_90_clockwise_swaps_dimensions() {
		let mut image = image_with_pixels(0, 0, 2, 3, &[1, 2, 3, 4, 5, 6]);
		rotate_image(&mut image, 20, 30, Rotation::Clockwise90);
		assert_eq!((3, 2), (image.width, image.height));
		assert_eq!(&[5, 3, 1, 6, 4, 2], image.pixels().unwrap());
	}

	#[test]
	fn rotate_180_is_a_double_flip() {
		let mut image = image_with_pixels(0, 0, 2, 2, &[1, 2, 3, 4]);
		rotate_image(&mut image, 10, 10, Rotation::Half180);
		assert_eq!(&[4, 3, 2, 1], image.pixels().unwrap());
	}

	#[test]
	fn scale_image_doubles_dimensions() {
		let mut image = image_with_pixels(0, 0, 2, 2, &[1, 2, 3, 4]);
		scale_image(&mut image, 2.0, 2.0);
		assert_eq!((4, 4), (image.width, image.height));
	}

	#[test]
	fn resize_stream_scales_every_image_to_the_new_screen() {
		let mut stream = Stream::new();
		stream.screen_width = 2;
		stream.screen_height = 2;
		stream.add_image(image_with_pixels(0, 0, 2, 2, &[1, 2, 3, 4]));
		resize_stream(&mut stream, 4, 4);
		assert_eq!((4, 4), (stream.screen_width, stream.screen_height));
		assert_eq!((4, 4), (stream.images[0].width, stream.images[0].height));
	}

	#[test]
	fn color_transform_pipeline_rewrites_global_and_local_colormaps() {
		let mut stream = Stream::new();
		let mut global = Colormap::new();
		global.push(Color::new(1, 1, 1));
		stream.global_colormap = Some(global);

		let mut image = Image::new(0, 0, 1, 1);
		let mut local = Colormap::new();
		local.push(Color::new(1, 1, 1));
		image.local_colormap = Some(local);
		stream.add_image(image);

		let mut pipeline = ColorTransformPipeline::new();
		pipeline.push_color_changes(vec![ColorChange { old: Color::new(1, 1, 1), new_color: Color::new(9, 9, 9) }]);
		pipeline.apply(&mut stream);

		assert_eq!(Color::new(9, 9, 9), stream.global_colormap.unwrap()[0]);
		assert_eq!(Color::new(9, 9, 9), stream.images[0].local_colormap.as_ref().unwrap()[0]);
	}
}
