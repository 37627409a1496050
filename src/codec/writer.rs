//! The GIF stream writer: header, logical screen descriptor, one block per image/extension,
//! and the trailer.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use thiserror::Error;

use crate::io::write_sub_blocks;
use crate::lzw;
use crate::model::{Colormap, Comment, Disposal, Extension, Image, ImageData, LoopCount, Stream};

const EXT_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_COMMENT: u8 = 0xFE;
const EXT_APPLICATION: u8 = 0xFF;
const EXT_NAME: u8 = 0xCE;

#[derive(Error, Debug)]
pub enum WriteError {
	#[error("image has no pixel data to write")]
	MissingPixelData,
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Writes a complete GIF stream (header through trailer) to `writer`.
pub fn write_stream<W: Write>(writer: &mut W, stream: &Stream) -> Result<(), WriteError> {
	write_header_and_screen(writer, stream, needs_gif89a(stream))?;
	for image in &stream.images {
		write_one_image(writer, stream, image)?;
	}
	write_trailer(writer, stream)
}

/// Whether anything in `stream` needs a GIF89a-only feature (loop extension, comments, per-image
/// identifiers/transparency/disposal/delay/extensions) - if not, GIF87a is the more conservative
/// signature to write.
fn needs_gif89a(stream: &Stream) -> bool {
	if stream.comment.is_some() || !stream.end_extensions.is_empty() || stream.loop_count.is_some() {
		return true;
	}
	stream.images.iter().any(|image| {
		image.identifier.is_some()
			|| image.transparent.is_some()
			|| image.disposal != Disposal::None
			|| image.delay != 0
			|| image.comment.is_some()
			|| !image.extensions.is_empty()
	})
}

/// Writes a GIF stream one frame at a time, for callers that produce images incrementally
/// instead of building a whole [`Stream`] up front (the reference library's
/// `Gif_IncrementalWriteFileInit`/`Gif_IncrementalWriteImage`/`Gif_IncrementalWriteComplete`
/// trio). `new` writes the header, logical screen descriptor, and loop extension; each
/// `write_image` call appends one more frame to whatever's already been written;
/// `finish` appends the stream's trailing extensions and the trailer byte and hands
/// the underlying writer back. Unlike [`write_stream`], this always writes a GIF89a signature -
/// whether a later frame will need an 89a-only feature isn't known yet when the header goes out.
pub struct IncrementalWriter<W> {
	writer: W,
}

impl<W: Write> IncrementalWriter<W> {
	pub fn new(mut writer: W, stream: &Stream) -> Result<Self, WriteError> {
		write_header_and_screen(&mut writer, stream, true)?;
		Ok(IncrementalWriter { writer })
	}

	/// Appends `image` as the next frame. `stream` provides the colour table and loop/comment
	/// context `image` itself doesn't carry; it need not be the same `Stream` across calls, but
	/// its global colour table should match what `new` was given.
	pub fn write_image(&mut self, stream: &Stream, image: &Image) -> Result<(), WriteError> {
		write_one_image(&mut self.writer, stream, image)
	}

	/// Writes the stream's trailing extensions and the trailer byte, then returns the
	/// underlying writer.
	pub fn finish(mut self, stream: &Stream) -> Result<W, WriteError> {
		write_trailer(&mut self.writer, stream)?;
		Ok(self.writer)
	}
}

fn write_header_and_screen<W: Write>(writer: &mut W, stream: &Stream, needs_89a: bool) -> Result<(), WriteError> {
	writer.write_all(if needs_89a { b"GIF89a" } else { b"GIF87a" })?;
	writer.write_u16::<LittleEndian>(stream.screen_width)?;
	writer.write_u16::<LittleEndian>(stream.screen_height)?;

	let mut packed = 0u8;
	if let Some(global) = &stream.global_colormap {
		packed |= 0b1000_0000;
		packed |= (global.min_code_bits() - 1) & 0b0000_0111;
	}
	writer.write_u8(packed)?;
	writer.write_u8(stream.background.unwrap_or(0))?;
	writer.write_u8(0)?; // pixel aspect ratio: unused

	if let Some(global) = &stream.global_colormap {
		write_colormap(writer, global)?;
	}

	if let Some(loop_count) = stream.loop_count {
		write_netscape_loop(writer, loop_count)?;
	}

	Ok(())
}

fn write_one_image<W: Write>(writer: &mut W, stream: &Stream, image: &Image) -> Result<(), WriteError> {
	for extension in &image.extensions {
		write_extension(writer, extension)?;
	}
	if let Some(comment) = &image.comment {
		write_comment_extensions(writer, comment)?;
	}
	if let Some(identifier) = &image.identifier {
		write_name_extension(writer, identifier)?;
	}
	write_graphic_control_extension(writer, image)?;
	write_image(writer, image, active_min_code_bits(stream, image))
}

fn write_trailer<W: Write>(writer: &mut W, stream: &Stream) -> Result<(), WriteError> {
	for extension in &stream.end_extensions {
		write_extension(writer, extension)?;
	}
	if let Some(comment) = &stream.comment {
		write_comment_extensions(writer, comment)?;
	}
	writer.write_u8(TRAILER)?;
	Ok(())
}

fn write_colormap<W: Write>(writer: &mut W, colormap: &Colormap) -> std::io::Result<()> {
	for color in colormap.padded_colors() {
		writer.write_u8(color.r)?;
		writer.write_u8(color.g)?;
		writer.write_u8(color.b)?;
	}
	Ok(())
}

fn write_netscape_loop<W: Write>(writer: &mut W, loop_count: LoopCount) -> std::io::Result<()> {
	let times = match loop_count {
		LoopCount::Forever => 0u16,
		LoopCount::Times(n) => n,
	};
	writer.write_u8(EXT_INTRODUCER)?;
	writer.write_u8(EXT_APPLICATION)?;
	writer.write_u8(11)?;
	writer.write_all(b"NETSCAPE2.0")?;
	let data = [1u8, (times & 0xff) as u8, (times >> 8) as u8];
	write_sub_blocks(writer, &data)
}

fn write_comment_extensions<W: Write>(writer: &mut W, comment: &Comment) -> std::io::Result<()> {
	for entry in comment.iter() {
		writer.write_u8(EXT_INTRODUCER)?;
		writer.write_u8(EXT_COMMENT)?;
		write_sub_blocks(writer, entry)?;
	}
	Ok(())
}

fn write_name_extension<W: Write>(writer: &mut W, identifier: &[u8]) -> std::io::Result<()> {
	writer.write_u8(EXT_INTRODUCER)?;
	writer.write_u8(EXT_NAME)?;
	write_sub_blocks(writer, identifier)
}

fn write_extension<W: Write>(writer: &mut W, extension: &Extension) -> std::io::Result<()> {
	writer.write_u8(EXT_INTRODUCER)?;
	writer.write_u8(extension.kind)?;
	if let Some(identifier) = &extension.identifier {
		writer.write_u8(identifier.len() as u8)?;
		writer.write_all(identifier)?;
	}
	write_sub_blocks(writer, &extension.data)
}

fn write_graphic_control_extension<W: Write>(writer: &mut W, image: &Image) -> std::io::Result<()> {
	if image.disposal == Disposal::None && image.delay == 0 && image.transparent.is_none() {
		return Ok(());
	}
	writer.write_u8(EXT_INTRODUCER)?;
	writer.write_u8(EXT_GRAPHIC_CONTROL)?;
	let mut packed = (image.disposal.to_raw() & 0b111) << 2;
	if image.transparent.is_some() {
		packed |= 0b0000_0001;
	}
	let data = [
		packed,
		(image.delay & 0xff) as u8,
		(image.delay >> 8) as u8,
		image.transparent.unwrap_or(0),
	];
	write_sub_blocks(writer, &data)
}

fn write_image<W: Write>(writer: &mut W, image: &Image, min_code_size: u8) -> Result<(), WriteError> {
	writer.write_u8(IMAGE_DESCRIPTOR)?;
	writer.write_u16::<LittleEndian>(image.left)?;
	writer.write_u16::<LittleEndian>(image.top)?;
	writer.write_u16::<LittleEndian>(image.width)?;
	writer.write_u16::<LittleEndian>(image.height)?;

	let mut packed = 0u8;
	if image.interlace {
		packed |= 0b0100_0000;
	}
	if let Some(local) = &image.local_colormap {
		packed |= 0b1000_0000;
		packed |= (local.min_code_bits() - 1) & 0b0000_0111;
	}
	writer.write_u8(packed)?;

	if let Some(local) = &image.local_colormap {
		write_colormap(writer, local)?;
	}

	match &image.data {
		ImageData::Compressed(framed) => {
			writer.write_all(framed)?;
		}
		ImageData::Uncompressed(pixels) => {
			let pixels = if image.interlace { interlace(pixels, image.width, image.height) } else { pixels.clone() };
			lzw::encode(writer, &pixels, min_code_size)?;
		}
	}

	Ok(())
}

/// The colour table an image's pixel indices are indices into - its own local table if it has
/// one, otherwise the stream's global table - determines how many bits its LZW codes need.
fn active_min_code_bits(stream: &Stream, image: &Image) -> u8 {
	stream
		.active_colormap(image)
		.map(Colormap::min_code_bits)
		.unwrap_or(2)
}

/// Reorders rows into GIF's four-pass interlace order for writing.
fn interlace(pixels: &[u8], width: u16, height: u16) -> Vec<u8> {
	let width = width as usize;
	let height = height as usize;
	let mut out = Vec::with_capacity(pixels.len());

	let passes: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
	for &(start, step) in &passes {
		let mut row = start;
		while row < height {
			let src_start = row * width;
			if src_start + width <= pixels.len() {
				out.extend_from_slice(&pixels[src_start..src_start + width]);
			}
			row += step;
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Color, Image, Stream};

	#[test]
	fn writes_a_minimal_stream_as_gif87a() {
		let mut stream = Stream::new();
		stream.screen_width = 1;
		stream.screen_height = 1;
		let mut cmap = Colormap::new();
		cmap.push(Color::new(0, 0, 0));
		stream.global_colormap = Some(cmap);
		stream.add_image(Image::new(0, 0, 1, 1));

		let mut out = Vec::new();
		write_stream(&mut out, &stream).unwrap();

		assert_eq!(b"GIF87a", &out[0..6]);
		assert_eq!(0x3B, *out.last().unwrap());
	}

	#[test]
	fn a_loop_count_forces_gif89a() {
		let mut stream = Stream::new();
		stream.screen_width = 1;
		stream.screen_height = 1;
		stream.loop_count = Some(LoopCount::Forever);
		stream.add_image(Image::new(0, 0, 1, 1));

		let mut out = Vec::new();
		write_stream(&mut out, &stream).unwrap();

		assert_eq!(b"GIF89a", &out[0..6]);
	}

	#[test]
	fn incremental_writer_matches_write_stream_byte_for_byte() {
		let mut stream = Stream::new();
		stream.screen_width = 2;
		stream.screen_height = 2;
		let mut cmap = Colormap::new();
		cmap.push(Color::new(1, 2, 3));
		cmap.push(Color::new(4, 5, 6));
		stream.global_colormap = Some(cmap);
		stream.add_image(Image::new(0, 0, 2, 2));
		stream.add_image(Image::new(0, 0, 2, 2));
		// write_stream only agrees with IncrementalWriter's always-GIF89a signature when the
		// stream itself needs GIF89a, so give it a feature that forces the match.
		stream.loop_count = Some(LoopCount::Forever);

		let mut whole = Vec::new();
		write_stream(&mut whole, &stream).unwrap();

		let mut incremental = IncrementalWriter::new(Vec::new(), &stream).unwrap();
		for image in &stream.images {
			incremental.write_image(&stream, image).unwrap();
		}
		let piecemeal = incremental.finish(&stream).unwrap();

		assert_eq!(whole, piecemeal);
	}
}
