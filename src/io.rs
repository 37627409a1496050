//! Low-level byte plumbing shared by the reader and writer: stream-length queries, the
//! sub-block framing GIF uses for LZW payloads, comments, and extensions, and a lenient
//! byte source that tolerates a truncated file instead of aborting.

use std::io::{Error, ErrorKind, Read, SeekFrom, Write};

/// Convenience method for determining the total size of a stream, as a stand-in for
/// [`std::io::Seek::stream_len`] while that remains unstable.
pub trait StreamSize {
	fn stream_size(&mut self) -> Result<u64, Error>;
}

impl<T: std::io::Seek> StreamSize for T {
	fn stream_size(&mut self) -> Result<u64, Error> {
		let old_pos = self.stream_position()?;
		let len = self.seek(SeekFrom::End(0))?;
		if old_pos != len {
			self.seek(SeekFrom::Start(old_pos))?;
		}
		Ok(len)
	}
}

pub trait ReadType {
	type OutputType;
	type ErrorType;

	fn read<T: Read>(reader: &mut T) -> Result<Self::OutputType, Self::ErrorType>;
}

pub trait WriteType {
	type ErrorType;

	fn write<T: Write>(&self, writer: &mut T) -> Result<(), Self::ErrorType>;
}

/// The maximum size of a single GIF sub-block payload: the length byte caps it at 255.
pub const MAX_SUB_BLOCK_LEN: usize = 255;

/// Reads a run of length-prefixed GIF sub-blocks (as used by image data, comments, and
/// application/plain-text extensions) up to and including the terminating zero-length
/// sub-block, concatenating their payloads.
///
/// Truncation mid-run is not treated as fatal: whatever was read so far is returned, and the
/// caller is expected to bump its stream's error counter. This matches the reference reader,
/// which prefers a best-effort partial image over aborting the whole file.
pub fn read_sub_blocks<R: Read>(reader: &mut R) -> (Vec<u8>, bool) {
	let mut data = Vec::new();
	loop {
		let mut len_byte = [0u8; 1];
		if reader.read_exact(&mut len_byte).is_err() {
			return (data, true);
		}
		let len = len_byte[0] as usize;
		if len == 0 {
			return (data, false);
		}
		let start = data.len();
		data.resize(start + len, 0);
		if reader.read_exact(&mut data[start..]).is_err() {
			data.truncate(start);
			return (data, true);
		}
	}
}

/// Writes `data` as a run of sub-blocks of at most [`MAX_SUB_BLOCK_LEN`] bytes each, followed
/// by the terminating zero-length sub-block.
pub fn write_sub_blocks<W: Write>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
	for chunk in data.chunks(MAX_SUB_BLOCK_LEN) {
		writer.write_all(&[chunk.len() as u8])?;
		writer.write_all(chunk)?;
	}
	writer.write_all(&[0u8])?;
	Ok(())
}

/// A byte source that never returns a hard error for running out of data early: reads past
/// end-of-input are satisfied with zero bytes and recorded, so a truncated GIF can still be
/// decoded as far as it goes.
pub struct LenientReader<R> {
	inner: R,
	/// Number of reads that ran past end-of-input and had to be zero-padded.
	pub errors: u32,
	hit_eof: bool,
}

impl<R: Read> LenientReader<R> {
	pub fn new(inner: R) -> Self {
		LenientReader { inner, errors: 0, hit_eof: false }
	}

	pub fn into_inner(self) -> R {
		self.inner
	}

	pub fn hit_eof(&self) -> bool {
		self.hit_eof
	}
}

impl<R: Read> Read for LenientReader<R> {
	fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
		self.inner.read(buf)
	}

	fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
		let mut filled = 0;
		while filled < buf.len() {
			match self.inner.read(&mut buf[filled..]) {
				Ok(0) => break,
				Ok(n) => filled += n,
				Err(e) if e.kind() == ErrorKind::Interrupted => continue,
				Err(e) => return Err(e),
			}
		}
		if filled < buf.len() {
			buf[filled..].fill(0);
			self.errors += 1;
			self.hit_eof = true;
		}
		Ok(())
	}
}

/// An in-memory sink that grows as bytes are written to it, used by callers who want to build
/// a GIF stream in memory rather than writing straight to a file.
#[derive(Debug, Default)]
pub struct GrowingSink {
	pub buffer: Vec<u8>,
}

impl GrowingSink {
	pub fn new() -> Self {
		GrowingSink::default()
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.buffer
	}
}

impl Write for GrowingSink {
	fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
		self.buffer.extend_from_slice(buf);
		Ok(buf.len())
	}

	fn flush(&mut self) -> std::io::Result<()> {
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn round_trips_sub_blocks() {
		let data: Vec<u8> = (0..600).map(|i| (i % 256) as u8).collect();
		let mut sink = GrowingSink::new();
		write_sub_blocks(&mut sink, &data).unwrap();

		let mut cursor = Cursor::new(sink.into_bytes());
		let (read_back, truncated) = read_sub_blocks(&mut cursor);
		assert!(!truncated);
		assert_eq!(data, read_back);
	}

	#[test]
	fn lenient_reader_zero_pads_on_truncation() {
		let mut reader = LenientReader::new(Cursor::new(vec![1u8, 2, 3]));
		let mut buf = [0u8; 5];
		reader.read_exact(&mut buf).unwrap();
		assert_eq!([1, 2, 3, 0, 0], buf);
		assert_eq!(1, reader.errors);
		assert!(reader.hit_eof());
	}

	#[test]
	fn truncated_sub_block_run_returns_partial_data() {
		// Length byte claims 10 bytes follow, but only 3 are present and no terminator.
		let mut cursor = Cursor::new(vec![10u8, 1, 2, 3]);
		let (data, truncated) = read_sub_blocks(&mut cursor);
		assert!(truncated);
		assert!(data.is_empty());
	}
}
