//! LZW (GIF-variant) decompression.
//!
//! Variable-width codes (2-12 bits), a reserved CLEAR code and end-of-information code, and
//! 255-byte sub-block framing, as described in [`crate::lzw`]. Decoding is deliberately lenient:
//! a corrupt or truncated code stream never aborts the whole image. Instead the offending code
//! is treated as code `0` and [`DecodeResult::errors`] is bumped, mirroring the reference
//! decoder's preference for a best-effort (if visibly wrong) image over a hard failure.

use std::io::Read;

use super::{
	code_mask, initial_table_size, LzwCode, CLEAR_CODE_OFFSET, EOI_CODE_OFFSET, MAX_CODE_BITS,
};

/// Bit-level reader over a run of GIF sub-blocks, yielding fixed-width (but changeable)
/// LZW codes.
struct CodeReader<'a, R> {
	reader: &'a mut R,
	buffer: u32,
	buffer_bits: u32,
	code_bits: u32,
	sub_block_remaining: u8,
	at_end: bool,
}

impl<'a, R: Read> CodeReader<'a, R> {
	fn new(reader: &'a mut R, code_bits: u32) -> Self {
		CodeReader { reader, buffer: 0, buffer_bits: 0, code_bits, sub_block_remaining: 0, at_end: false }
	}

	fn set_code_bits(&mut self, bits: u32) {
		self.code_bits = bits;
	}

	fn next_byte(&mut self) -> Option<u8> {
		if self.at_end {
			return None;
		}
		if self.sub_block_remaining == 0 {
			let mut len_byte = [0u8; 1];
			if self.reader.read_exact(&mut len_byte).is_err() {
				self.at_end = true;
				return None;
			}
			self.sub_block_remaining = len_byte[0];
			if self.sub_block_remaining == 0 {
				self.at_end = true;
				return None;
			}
		}
		self.sub_block_remaining -= 1;
		let mut byte = [0u8; 1];
		if self.reader.read_exact(&mut byte).is_err() {
			self.at_end = true;
			return None;
		}
		Some(byte[0])
	}

	/// Returns the next code, or `None` once the sub-block run and any buffered bits are
	/// exhausted.
	fn next_code(&mut self) -> Option<LzwCode> {
		while self.buffer_bits < self.code_bits {
			let byte = self.next_byte()?;
			self.buffer |= (byte as u32) << self.buffer_bits;
			self.buffer_bits += 8;
		}
		let code = (self.buffer & code_mask(self.code_bits)) as LzwCode;
		self.buffer >>= self.code_bits;
		self.buffer_bits -= self.code_bits;
		Some(code)
	}
}

pub struct DecodeResult {
	pub data: Vec<u8>,
	/// Number of times a malformed code was silently patched over.
	pub errors: u32,
}

/// Decodes one image's worth of LZW data from `reader`, which must be positioned at the
/// leading minimum-code-size byte.
pub fn decode<R: Read>(reader: &mut R) -> std::io::Result<DecodeResult> {
	let mut min_code_size_byte = [0u8; 1];
	reader.read_exact(&mut min_code_size_byte)?;
	// Clamp leniently: some encoders write a minimum code size of 1, which the reference
	// decoder treats as 2.
	let min_code_size = min_code_size_byte[0].clamp(2, 8) as u32;

	let mut errors = 0u32;
	let clear_code = initial_table_size(min_code_size) as LzwCode + CLEAR_CODE_OFFSET;
	let eoi_code = initial_table_size(min_code_size) as LzwCode + EOI_CODE_OFFSET;

	let mut code_bits = min_code_size + 1;
	let mut code_reader = CodeReader::new(reader, code_bits);

	let mut out = Vec::new();
	let mut table: Vec<Option<Vec<u8>>> = Vec::new();
	let mut next_code: LzwCode = 0;
	let reset_table = |table: &mut Vec<Option<Vec<u8>>>, next_code: &mut LzwCode| {
		table.clear();
		table.resize((1usize << MAX_CODE_BITS) as usize, None);
		for i in 0..initial_table_size(min_code_size) {
			table[i] = Some(vec![i as u8]);
		}
		*next_code = initial_table_size(min_code_size) as LzwCode + 2;
	};
	reset_table(&mut table, &mut next_code);

	let mut prev_code: Option<LzwCode> = None;

	loop {
		let code = match code_reader.next_code() {
			Some(c) => c,
			None => break,
		};

		if code == clear_code {
			code_bits = min_code_size + 1;
			code_reader.set_code_bits(code_bits);
			reset_table(&mut table, &mut next_code);
			prev_code = None;
			continue;
		}
		if code == eoi_code {
			break;
		}

		let entry: Vec<u8> = if (code as usize) < table.len() && table[code as usize].is_some() {
			table[code as usize].clone().unwrap()
		} else if code == next_code && prev_code.is_some() {
			// KwKwK case: code names exactly the next table slot, legal only in that case.
			let prev = prev_code.unwrap();
			if let Some(prev_entry) = &table[prev as usize] {
				let mut entry = prev_entry.clone();
				entry.push(prev_entry[0]);
				entry
			} else {
				errors += 1;
				vec![0]
			}
		} else {
			// Illegal forward reference (or an unrecognized code with no previous code to
			// extrapolate from): treat it as code 0 and keep going.
			errors += 1;
			vec![0]
		};

		out.extend_from_slice(&entry);

		if let Some(prev) = prev_code {
			if (next_code as usize) < table.len() {
				if let Some(prev_entry) = &table[prev as usize] {
					let mut new_entry = prev_entry.clone();
					new_entry.push(entry[0]);
					table[next_code as usize] = Some(new_entry);
					next_code += 1;
				}
			}
		}

		if next_code >= (1 << code_bits) && code_bits < MAX_CODE_BITS {
			code_bits += 1;
			code_reader.set_code_bits(code_bits);
		}

		prev_code = Some(code);
	}

	Ok(DecodeResult { data: out, errors })
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Cursor;

	#[test]
	fn decodes_reference_vector() {
		let packed: &[u8] =
			&[0x08, 0x0b, 0x00, 0x51, 0xfc, 0x1b, 0x28, 0x70, 0xa0, 0xc1, 0x83, 0x01, 0x01, 0x00];
		let expected: &[u8] =
			&[0x28, 0xff, 0xff, 0xff, 0x28, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
		let mut cursor = Cursor::new(packed);
		let result = decode(&mut cursor).unwrap();
		assert_eq!(expected, result.data.as_slice());
		assert_eq!(0, result.errors);
	}

	#[test]
	fn truncated_stream_returns_partial_data_without_panicking() {
		let packed: &[u8] = &[0x02, 0x16, 0x8c];
		let mut cursor = Cursor::new(packed);
		let result = decode(&mut cursor).unwrap();
		// Whatever was decodable before running out of sub-block data, with no panic.
		assert!(result.data.len() <= 3);
	}

	#[test]
	fn forward_reference_past_next_code_is_an_error() {
		// min_code_size 2: clear=4, eoi=5, table starts at next_code=6, code_bits=3.
		// Codes sent: CLEAR, 7 (neither a table entry nor equal to next_code - illegal), EOI.
		let packed: &[u8] = &[0x02, 0x02, 0x7c, 0x01, 0x00];
		let mut cursor = Cursor::new(packed);
		let result = decode(&mut cursor).unwrap();
		assert_eq!(1, result.errors);
		assert_eq!(&[0], result.data.as_slice());
	}
}
