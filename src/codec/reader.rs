//! The GIF stream reader: header, logical screen descriptor, an arbitrary run of images and
//! extensions, and the trailer.

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::io::LenientReader;
use crate::lzw;
use crate::model::{Color, Colormap, Comment, Disposal, Extension, Image, ImageData, LoopCount, Stream};

const EXT_INTRODUCER: u8 = 0x21;
const IMAGE_DESCRIPTOR: u8 = 0x2C;
const TRAILER: u8 = 0x3B;

const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_COMMENT: u8 = 0xFE;
const EXT_APPLICATION: u8 = 0xFF;
const EXT_NAME: u8 = 0xCE;

const LOCAL_COLOR_TABLE_FLAG: u8 = 0b1000_0000;
const INTERLACE_FLAG: u8 = 0b0100_0000;
const GLOBAL_COLOR_TABLE_FLAG: u8 = 0b1000_0000;

#[derive(Error, Debug)]
pub enum ReadError {
	#[error("not a GIF file (bad signature)")]
	BadSignature,
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// Decoded flags relaxing how strictly a GIF is parsed. Currently unused fields are reserved
/// for callers that need to, e.g., stop at the first image rather than reading the whole
/// stream; both are always read fully today.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFlags {
	/// Skip decompressing image data; leave images holding their raw LZW bytes instead.
	pub skip_image_data: bool,
}

/// Reads a complete GIF stream (header through trailer) from `reader`.
pub fn read_stream<R: Read>(reader: R, flags: ReadFlags) -> Result<Stream, ReadError> {
	let mut reader = LenientReader::new(reader);

	let mut signature = [0u8; 6];
	reader.read_exact(&mut signature)?;
	if &signature[0..3] != b"GIF" || (&signature[3..6] != b"87a" && &signature[3..6] != b"89a") {
		return Err(ReadError::BadSignature);
	}

	let mut stream = Stream::new();
	stream.screen_width = reader.read_u16::<LittleEndian>()?;
	stream.screen_height = reader.read_u16::<LittleEndian>()?;

	let packed = reader.read_u8()?;
	let global_table_present = packed & GLOBAL_COLOR_TABLE_FLAG != 0;
	let global_table_bits = (packed & 0b0000_0111) + 1;
	let background_index = reader.read_u8()?;
	let _pixel_aspect_ratio = reader.read_u8()?;

	if global_table_present {
		stream.global_colormap = Some(read_colormap(&mut reader, 1usize << global_table_bits)?);
		stream.background = Some(background_index);
	}

	let mut pending_disposal = Disposal::None;
	let mut pending_delay = 0u16;
	let mut pending_transparent: Option<u8> = None;
	let mut pending_comment: Option<Comment> = None;
	let mut pending_identifier: Option<Vec<u8>> = None;

	loop {
		let block_kind = match reader.read_u8() {
			Ok(b) => b,
			Err(_) => break,
		};

		match block_kind {
			TRAILER => break,
			EXT_INTRODUCER => {
				let label = reader.read_u8()?;
				match label {
					EXT_GRAPHIC_CONTROL => {
						let (data, _) = crate::io::read_sub_blocks(&mut reader);
						if data.len() >= 4 {
							pending_disposal = Disposal::from_raw((data[0] >> 2) & 0b111);
							pending_delay = u16::from_le_bytes([data[1], data[2]]);
							if data[0] & 0b0000_0001 != 0 {
								pending_transparent = Some(data[3]);
							} else {
								pending_transparent = None;
							}
						}
					}
					EXT_COMMENT => {
						let (data, _) = crate::io::read_sub_blocks(&mut reader);
						pending_comment.get_or_insert_with(Comment::new).add(data);
					}
					EXT_NAME => {
						let (data, _) = crate::io::read_sub_blocks(&mut reader);
						pending_identifier = Some(data);
					}
					EXT_APPLICATION => {
						let mut header = [0u8; 1];
						reader.read_exact(&mut header)?;
						let id_len = header[0] as usize;
						let mut identifier = vec![0u8; id_len];
						reader.read_exact(&mut identifier)?;
						let (data, _) = crate::io::read_sub_blocks(&mut reader);
						if identifier == b"NETSCAPE2.0" && data.len() >= 3 {
							let times = u16::from_le_bytes([data[1], data[2]]);
							stream.loop_count = Some(if times == 0 {
								LoopCount::Forever
							} else {
								LoopCount::Times(times)
							});
						} else {
							let extension = Extension::new(EXT_APPLICATION, Some(identifier), data);
							stream.add_end_extension(extension);
						}
					}
					_ => {
						let (data, _) = crate::io::read_sub_blocks(&mut reader);
						let extension = Extension::new(label, None, data);
						stream.add_end_extension(extension);
					}
				}
			}
			IMAGE_DESCRIPTOR => {
				let left = reader.read_u16::<LittleEndian>()?;
				let top = reader.read_u16::<LittleEndian>()?;
				let width = reader.read_u16::<LittleEndian>()?;
				let height = reader.read_u16::<LittleEndian>()?;
				let image_packed = reader.read_u8()?;
				let interlace = image_packed & INTERLACE_FLAG != 0;
				let local_table_present = image_packed & LOCAL_COLOR_TABLE_FLAG != 0;
				let local_table_bits = (image_packed & 0b0000_0111) + 1;

				let local_colormap = if local_table_present {
					Some(read_colormap(&mut reader, 1usize << local_table_bits)?)
				} else {
					None
				};

				let pixels = if flags.skip_image_data {
					let min_code_size = reader.read_u8()?;
					let (compressed, _) = crate::io::read_sub_blocks(&mut reader);
					let mut framed = vec![min_code_size];
					framed.extend_from_slice(&compressed);
					ImageData::Compressed(framed)
				} else {
					let decoded = lzw::decode(&mut reader)?;
					if decoded.errors > 0 {
						log::warn!("image {}: recovered from {} malformed LZW code(s)", stream.len(), decoded.errors);
					}
					stream.errors += decoded.errors;
					fix_pixel_count(decoded.data, width, height)
				};

				let mut image = Image::new(left, top, width, height);
				image.interlace = interlace;
				image.local_colormap = local_colormap;
				image.disposal = pending_disposal;
				image.delay = pending_delay;
				image.transparent = pending_transparent;
				image.identifier = pending_identifier.take();
				image.comment = pending_comment.take();
				image.data = if interlace {
					deinterlace(pixels, width, height)
				} else {
					pixels
				};

				stream.add_image(image);

				pending_disposal = Disposal::None;
				pending_delay = 0;
				pending_transparent = None;
			}
			_ => {
				// Unknown block introducer: lenient readers keep going rather than aborting,
				// but there is no reliable way to know how many bytes to skip, so treat it as
				// the end of the stream.
				log::warn!("unrecognized block introducer 0x{:02x}, stopping early", block_kind);
				stream.errors += 1;
				break;
			}
		}
	}

	// A comment after the last image (or in a stream with no images at all) belongs to the
	// stream itself rather than to any frame.
	if let Some(comment) = pending_comment {
		for entry in comment.iter() {
			stream.comment.get_or_insert_with(Comment::new).add(entry.to_vec());
		}
	}

	stream.errors += reader.errors;
	Ok(stream)
}

fn read_colormap<R: Read>(reader: &mut R, size: usize) -> Result<Colormap, ReadError> {
	let mut colors = Vec::with_capacity(size);
	for _ in 0..size {
		let r = reader.read_u8()?;
		let g = reader.read_u8()?;
		let b = reader.read_u8()?;
		colors.push(Color::new(r, g, b));
	}
	Ok(Colormap::from_colors(colors).expect("color table size is always <= MAX_COLORS"))
}

/// The LZW stream can legally decode to more or fewer bytes than `width * height` if the
/// encoder was buggy or the file was truncated; clamp to the expected size leniently rather
/// than panicking on an out-of-bounds pixel access later.
fn fix_pixel_count(mut data: Vec<u8>, width: u16, height: u16) -> ImageData {
	let expected = width as usize * height as usize;
	data.resize(expected, 0);
	ImageData::Uncompressed(data)
}

/// Un-shuffles interlaced row order (GIF interlacing writes rows in four passes: every 8th
/// starting at 0, every 8th starting at 4, every 4th starting at 2, every 2nd starting at 1).
fn deinterlace(data: ImageData, width: u16, height: u16) -> ImageData {
	let ImageData::Uncompressed(pixels) = data else { return data };
	let width = width as usize;
	let height = height as usize;
	let mut out = vec![0u8; pixels.len()];

	let passes: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
	let mut src_row = 0usize;
	for &(start, step) in &passes {
		let mut row = start;
		while row < height {
			let src_start = src_row * width;
			let dst_start = row * width;
			if src_start + width <= pixels.len() && dst_start + width <= out.len() {
				out[dst_start..dst_start + width].copy_from_slice(&pixels[src_start..src_start + width]);
			}
			src_row += 1;
			row += step;
		}
	}

	ImageData::Uncompressed(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::writer::write_stream;
	use crate::model::{Color, Colormap, Image};

	fn sample_stream() -> Stream {
		let mut stream = Stream::new();
		stream.screen_width = 2;
		stream.screen_height = 2;
		let mut cmap = Colormap::new();
		cmap.push(Color::new(255, 0, 0));
		cmap.push(Color::new(0, 255, 0));
		stream.global_colormap = Some(cmap);
		stream.background = Some(0);

		let mut image = Image::new(0, 0, 2, 2);
		if let Some(pixels) = image.pixels_mut() {
			pixels.copy_from_slice(&[0, 1, 1, 0]);
		}
		stream.add_image(image);
		stream
	}

	#[test]
	fn round_trips_a_minimal_stream() {
		let original = sample_stream();
		let mut bytes = Vec::new();
		write_stream(&mut bytes, &original).unwrap();

		let read_back = read_stream(bytes.as_slice(), ReadFlags::default()).unwrap();
		assert_eq!(original.screen_width, read_back.screen_width);
		assert_eq!(original.screen_height, read_back.screen_height);
		assert_eq!(1, read_back.len());
		assert_eq!(original.images[0].pixels(), read_back.images[0].pixels());
		assert_eq!(0, read_back.errors);
	}

	#[test]
	fn rejects_bad_signature() {
		let data = b"NOTAGIF89a";
		let result = read_stream(data.as_slice(), ReadFlags::default());
		assert!(matches!(result, Err(ReadError::BadSignature)));
	}

	#[test]
	fn round_trips_per_image_comment_and_name() {
		let mut stream = sample_stream();
		let mut comment = crate::model::Comment::new();
		comment.add(b"frame one".to_vec());
		stream.images[0].comment = Some(comment);
		stream.images[0].identifier = Some(b"first".to_vec());

		let mut bytes = Vec::new();
		write_stream(&mut bytes, &stream).unwrap();

		let read_back = read_stream(bytes.as_slice(), ReadFlags::default()).unwrap();
		assert_eq!(Some(b"first".to_vec()), read_back.images[0].identifier);
		assert_eq!(vec![b"frame one".to_vec()], read_back.images[0].comment.as_ref().unwrap().iter().map(<[u8]>::to_vec).collect::<Vec<_>>());
		assert!(read_back.comment.is_none());
	}

	#[test]
	fn round_trips_an_end_of_stream_comment() {
		let mut stream = sample_stream();
		let mut comment = crate::model::Comment::new();
		comment.add(b"trailing".to_vec());
		stream.comment = Some(comment);

		let mut bytes = Vec::new();
		write_stream(&mut bytes, &stream).unwrap();

		let read_back = read_stream(bytes.as_slice(), ReadFlags::default()).unwrap();
		assert!(read_back.images[0].comment.is_none());
		assert_eq!(vec![b"trailing".to_vec()], read_back.comment.as_ref().unwrap().iter().map(<[u8]>::to_vec).collect::<Vec<_>>());
	}
}
