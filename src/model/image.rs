use super::colormap::Colormap;
use super::comment::Comment;
use super::extension::Extension;

/// What a decoder should do with an image's pixels before displaying the next frame in the
/// stream, taken from the Graphic Control Extension's disposal method field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Disposal {
	/// No disposal specified; leave the image in place.
	#[default]
	None = 0,
	/// Leave the image in place (same observable behaviour as `None`, but recorded
	/// explicitly - some encoders distinguish the two for optimizer bookkeeping).
	Asis = 1,
	/// Restore the background colour (or transparency) over the image's bounds.
	Background = 2,
	/// Restore whatever was visible before this image was drawn.
	Previous = 3,
}

impl Disposal {
	/// Decodes a raw 3-bit Graphic Control Extension disposal field. Unknown values (4-7) are
	/// accepted leniently and folded into `None`, matching the reference reader's refusal to
	/// treat unrecognized disposal codes as a fatal error.
	pub fn from_raw(value: u8) -> Self {
		match value {
			1 => Disposal::Asis,
			2 => Disposal::Background,
			3 => Disposal::Previous,
			_ => Disposal::None,
		}
	}

	pub fn to_raw(self) -> u8 {
		self as u8
	}
}

/// The pixel data backing an [`Image`], in one of the two forms the codec passes it around in.
///
/// Most callers only ever see `Uncompressed` data (one colour-table index per pixel, row-major,
/// `width * height` entries); `Compressed` is populated instead when the writer or optimizer has
/// prepared LZW codes ahead of time and the uncompressed form has been discarded to save memory,
/// mirroring the original library's `img->image_data` / `img->compressed` duality.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ImageData {
	/// One colour-table index per pixel, row-major, `width * height` bytes.
	Uncompressed(Vec<u8>),
	/// Already-LZW-encoded sub-block payload (GIF's on-disk representation: the leading
	/// min-code-size byte followed by length-prefixed sub-blocks, terminated by an empty
	/// sub-block).
	Compressed(Vec<u8>),
}

/// A single frame of a GIF stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
	pub left: u16,
	pub top: u16,
	pub width: u16,
	pub height: u16,
	pub interlace: bool,
	/// This image's local colour table, if it has one distinct from the stream's global table.
	pub local_colormap: Option<Colormap>,
	/// Index into the active colour table (local, else global) that should be treated as
	/// transparent, if any.
	pub transparent: Option<u8>,
	pub disposal: Disposal,
	/// Delay before the next frame is shown, in hundredths of a second.
	pub delay: u16,
	/// A `GIF_EXTENSION_NAME`/`GIF_EXTENSION_COMMENT`-adjacent per-frame identifier, not part
	/// of the base GIF format but preserved when present (gifsicle's `#name` extension).
	pub identifier: Option<Vec<u8>>,
	pub comment: Option<Comment>,
	/// Extensions that precede this image in the stream.
	pub extensions: Vec<Extension>,
	pub data: ImageData,
}

impl Image {
	/// Creates a new image of the given size, filled with colour-table index 0 and no
	/// transparency, disposal, delay, or local colour table.
	pub fn new(left: u16, top: u16, width: u16, height: u16) -> Self {
		let pixels = width as usize * height as usize;
		Image {
			left,
			top,
			width,
			height,
			interlace: false,
			local_colormap: None,
			transparent: None,
			disposal: Disposal::None,
			delay: 0,
			identifier: None,
			comment: None,
			extensions: Vec::new(),
			data: ImageData::Uncompressed(vec![0u8; pixels]),
		}
	}

	#[inline]
	pub fn has_transparency(&self) -> bool {
		self.transparent.is_some()
	}

	/// This image's pixel count (`width * height`).
	#[inline]
	pub fn pixel_count(&self) -> usize {
		self.width as usize * self.height as usize
	}

	/// Returns the uncompressed pixel indices, decompressing in place first if this image
	/// currently only holds compressed data.
	pub fn pixels(&self) -> Option<&[u8]> {
		match &self.data {
			ImageData::Uncompressed(pixels) => Some(pixels),
			ImageData::Compressed(_) => None,
		}
	}

	pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
		match &mut self.data {
			ImageData::Uncompressed(pixels) => Some(pixels),
			ImageData::Compressed(_) => None,
		}
	}

	/// True if this image is fully within `(0, 0, screen_width, screen_height)`.
	pub fn fits_screen(&self, screen_width: u16, screen_height: u16) -> bool {
		self.left as u32 + self.width as u32 <= screen_width as u32
			&& self.top as u32 + self.height as u32 <= screen_height as u32
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_image_is_zeroed() {
		let img = Image::new(1, 2, 4, 3);
		assert_eq!(12, img.pixel_count());
		assert_eq!(Some([0u8; 12].as_slice()), img.pixels());
		assert!(!img.has_transparency());
	}

	#[test]
	fn disposal_round_trips() {
		for raw in 0..4u8 {
			assert_eq!(raw, Disposal::from_raw(raw).to_raw());
		}
		// Unknown disposal codes fold leniently into None.
		assert_eq!(Disposal::None, Disposal::from_raw(7));
	}

	#[test]
	fn fits_screen_checks_bounds() {
		let img = Image::new(10, 10, 5, 5);
		assert!(img.fits_screen(15, 15));
		assert!(!img.fits_screen(14, 15));
		assert!(!img.fits_screen(15, 14));
	}
}
