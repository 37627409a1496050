use std::collections::HashSet;

use super::colormap::Colormap;
use super::comment::Comment;
use super::extension::{Extension, ExtensionTarget};
use super::image::Image;

/// A loop count for the Netscape 2.0 application extension: `Forever`, or a specific finite
/// repeat count (`0` meaning "play once", matching the raw on-disk encoding).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopCount {
	Forever,
	Times(u16),
}

/// A complete, in-memory GIF stream: one or more images sharing a logical screen and,
/// optionally, a global colour table.
///
/// This is the crate's top-level object, corresponding to the reference library's
/// `Gif_Stream`. Unlike that C structure, images and trailing extensions are owned outright by
/// `Vec`s here rather than reference-counted: dropping a `Stream` drops everything it contains,
/// and there is no separate "free" step.
#[derive(Default)]
pub struct Stream {
	pub screen_width: u16,
	pub screen_height: u16,
	pub global_colormap: Option<Colormap>,
	/// Index into the global colour table that should be used to fill areas outside every
	/// image's bounds.
	pub background: Option<u8>,
	pub images: Vec<Image>,
	pub loop_count: Option<LoopCount>,
	/// Extensions attached after the last image (or, if there are no images, at the very end
	/// of the stream).
	pub end_extensions: Vec<Extension>,
	pub comment: Option<Comment>,
	/// Number of recoverable errors encountered while decoding this stream (see the lenient
	/// decoder behaviour documented on [`crate::codec::reader`]). Zero for a stream that
	/// was never read from a byte source.
	pub errors: u32,
	/// A short description of where this stream came from, for diagnostics (e.g. a file path).
	pub landmark: Option<String>,
	/// Keys of warnings already emitted for this stream, so repeat-prone ones (e.g. "needed a
	/// local colormap") are logged once rather than once per frame.
	warnings_seen: HashSet<&'static str>,
	/// Callbacks run (in registration order) from [`Stream::remove_image`] just before an image
	/// is dropped, e.g. to let a caller release resources keyed by image identity. The reference
	/// library calls these "deletion hooks".
	delete_hooks: Vec<Box<dyn FnMut(&Image)>>,
}

impl std::fmt::Debug for Stream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Stream")
			.field("screen_width", &self.screen_width)
			.field("screen_height", &self.screen_height)
			.field("global_colormap", &self.global_colormap)
			.field("background", &self.background)
			.field("images", &self.images)
			.field("loop_count", &self.loop_count)
			.field("end_extensions", &self.end_extensions)
			.field("comment", &self.comment)
			.field("errors", &self.errors)
			.field("landmark", &self.landmark)
			.field("delete_hooks", &self.delete_hooks.len())
			.finish()
	}
}

impl Stream {
	pub fn new() -> Self {
		Stream::default()
	}

	/// Appends an image, returning its index within [`Stream::images`].
	pub fn add_image(&mut self, image: Image) -> usize {
		self.images.push(image);
		self.images.len() - 1
	}

	/// Removes and returns the image at `index`, running every registered delete hook on it
	/// first.
	pub fn remove_image(&mut self, index: usize) -> Image {
		let image = self.images.remove(index);
		for hook in &mut self.delete_hooks {
			hook(&image);
		}
		image
	}

	/// Registers a callback to run on each image just before [`Stream::remove_image`] removes
	/// it, in registration order.
	pub fn add_delete_hook(&mut self, hook: impl FnMut(&Image) + 'static) {
		self.delete_hooks.push(Box::new(hook));
	}

	#[inline]
	pub fn len(&self) -> usize {
		self.images.len()
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.images.is_empty()
	}

	/// The colour table that should be used to interpret `image`'s pixels: its own local table
	/// if it has one, otherwise this stream's global table.
	pub fn active_colormap<'a>(&'a self, image: &'a Image) -> Option<&'a Colormap> {
		image.local_colormap.as_ref().or(self.global_colormap.as_ref())
	}

	/// Appends an extension at the end of the stream, recording its attachment point.
	pub fn add_end_extension(&mut self, mut extension: Extension) {
		extension.set_target(ExtensionTarget::EndOfStream);
		self.end_extensions.push(extension);
	}

	/// Appends an extension that precedes `image_index` in the stream.
	pub fn add_image_extension(&mut self, image_index: usize, mut extension: Extension) {
		extension.set_target(ExtensionTarget::BeforeImage(image_index));
		self.images[image_index].extensions.push(extension);
	}

	/// Logs `message` at `warn` level the first time this stream sees `key`; later calls with
	/// the same key are silently dropped. Used for warnings that would otherwise repeat once per
	/// frame (a local colormap being required, say) but are only informative the first time.
	pub fn warn_once(&mut self, key: &'static str, message: &str) {
		if self.warnings_seen.insert(key) {
			log::warn!("{}", message);
		}
	}

	/// Every pixel index that some image in the stream actually uses, in its own colour table
	/// (local if present, else global). Used by the optimizer and by colormap-shrinking
	/// transforms to drop unused trailing entries.
	pub fn used_colors(&self, image: &Image) -> Vec<bool> {
		let colormap_len = self.active_colormap(image).map(Colormap::len).unwrap_or(0);
		let mut used = vec![false; colormap_len];
		if let Some(pixels) = image.pixels() {
			for &p in pixels {
				if (p as usize) < used.len() {
					used[p as usize] = true;
				}
			}
		}
		used
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::color::Color;

	#[test]
	fn add_and_remove_images() {
		let mut stream = Stream::new();
		let i0 = stream.add_image(Image::new(0, 0, 2, 2));
		let i1 = stream.add_image(Image::new(0, 0, 3, 3));
		assert_eq!(0, i0);
		assert_eq!(1, i1);
		assert_eq!(2, stream.len());
		let removed = stream.remove_image(0);
		assert_eq!(2, removed.width);
		assert_eq!(1, stream.len());
	}

	#[test]
	fn active_colormap_prefers_local() {
		let mut stream = Stream::new();
		let mut global = Colormap::new();
		global.push(Color::new(1, 1, 1));
		stream.global_colormap = Some(global);

		let mut image = Image::new(0, 0, 1, 1);
		assert_eq!(1, stream.active_colormap(&image).unwrap().len());

		let mut local = Colormap::new();
		local.push(Color::new(2, 2, 2));
		local.push(Color::new(3, 3, 3));
		image.local_colormap = Some(local);
		assert_eq!(2, stream.active_colormap(&image).unwrap().len());
	}

	#[test]
	fn delete_hook_runs_once_per_removed_image() {
		use std::cell::RefCell;
		use std::rc::Rc;

		let mut stream = Stream::new();
		stream.add_image(Image::new(0, 0, 2, 2));
		stream.add_image(Image::new(0, 0, 3, 3));

		let seen_widths = Rc::new(RefCell::new(Vec::new()));
		let recorder = Rc::clone(&seen_widths);
		stream.add_delete_hook(move |image| recorder.borrow_mut().push(image.width));

		stream.remove_image(0);
		stream.remove_image(0);

		assert_eq!(vec![2, 3], *seen_widths.borrow());
	}

	#[test]
	fn warn_once_reports_a_key_only_on_its_first_use() {
		let mut stream = Stream::new();
		assert!(stream.warnings_seen.is_empty());
		stream.warn_once("local_colormap_required", "first");
		stream.warn_once("local_colormap_required", "second");
		assert_eq!(1, stream.warnings_seen.len());
	}

	#[test]
	fn used_colors_tracks_referenced_indices() {
		let mut stream = Stream::new();
		let mut global = Colormap::with_capacity(4);
		for i in 0..4 {
			global.push(Color::new(i, i, i));
		}
		stream.global_colormap = Some(global);

		let mut image = Image::new(0, 0, 2, 2);
		if let Some(pixels) = image.pixels_mut() {
			pixels.copy_from_slice(&[0, 2, 2, 0]);
		}
		let used = stream.used_colors(&image);
		assert_eq!(vec![true, false, true, false], used);
	}
}
