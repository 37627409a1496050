/// Where an [`Extension`] is currently attached. An extension belongs to at most one
/// location in the object graph; [`Extension::detach`] clears this back to `Detached` before
/// the extension is moved somewhere else, matching the "moving first unlinks" invariant from
/// the C original's linked `Gif_Extension::stream`/`position` fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum ExtensionTarget {
	#[default]
	Detached,
	/// Attached at the end of the stream (after the last image).
	EndOfStream,
	/// Attached before the image at this index.
	BeforeImage(usize),
}

/// A preserved GIF extension block that this crate's reader/writer don't otherwise understand
/// (or, for the graphic control / comment / name / Netscape loop extensions, one the reader
/// chose to represent generically rather than folding into dedicated [`crate::model::Image`]
/// / [`crate::model::Stream`] fields).
///
/// The reader always strips an extension's sub-block framing down to one concatenated payload,
/// and the writer always re-frames it into fresh 255-byte sub-blocks on the way back out -
/// round-tripping an extension never needs to preserve the exact original chunk boundaries.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Extension {
	/// The extension label byte (the second byte after the `0x21` introducer).
	pub kind: u8,
	/// The application identifier + authentication code, for `kind == 0xFF` (application
	/// extensions) only.
	pub identifier: Option<Vec<u8>>,
	/// The extension's concatenated sub-block payload.
	pub data: Vec<u8>,
	target: ExtensionTarget,
}

impl Extension {
	pub fn new(kind: u8, identifier: Option<Vec<u8>>, data: Vec<u8>) -> Self {
		Extension { kind, identifier, data, target: ExtensionTarget::Detached }
	}

	pub fn target(&self) -> ExtensionTarget {
		self.target
	}

	pub(crate) fn set_target(&mut self, target: ExtensionTarget) {
		self.target = target;
	}

	/// Marks this extension as no longer attached anywhere. Callers that move an extension
	/// between containers should call this first (for diagnostic purposes; ownership itself
	/// is already enforced by Rust's move semantics once the extension leaves its `Vec`).
	pub fn detach(&mut self) {
		self.target = ExtensionTarget::Detached;
	}
}
