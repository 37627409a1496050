//! LZW (GIF-variant) compression.
//!
//! Builds an adaptive dictionary exactly like a textbook LZW encoder, but adds one thing the
//! format's usual treatment skips: an early, run-length-aware CLEAR decision. Plain LZW only
//! clears the table once it's completely full (4096 entries), which wastes a lot of the
//! table's later entries on material that would compress better if the table were reset while
//! runs are still being produced. The heuristic here — an exponentially-weighted moving
//! average of run lengths — is the one the reference encoder uses to decide when continuing
//! to extend the table stops paying for itself.

use std::collections::HashMap;
use std::io::Write;

use super::{code_mask, initial_table_size, LzwCode, CLEAR_CODE_OFFSET, EOI_CODE_OFFSET, MAX_CODE_BITS};

/// Shift applied when folding a new run length into the running average.
const RUN_EWMA_SHIFT: u32 = 4;
/// Fixed-point scale the EWMA accumulator is kept at.
const RUN_EWMA_SCALE: u32 = 19;
/// An EWMA (in the fixed-point scale above) at or below this is "not worth clearing yet".
const RUN_INV_THRESH: u32 = (1u32 << RUN_EWMA_SCALE) / 3000;

struct BitWriter<'a, W> {
	writer: &'a mut W,
	buffer: u32,
	buffer_bits: u32,
	code_bits: u32,
	sub_block: Vec<u8>,
}

impl<'a, W: Write> BitWriter<'a, W> {
	fn new(writer: &'a mut W, code_bits: u32) -> Self {
		BitWriter { writer, buffer: 0, buffer_bits: 0, code_bits, sub_block: Vec::with_capacity(255) }
	}

	fn set_code_bits(&mut self, bits: u32) {
		self.code_bits = bits;
	}

	fn push_byte(&mut self, byte: u8) -> std::io::Result<()> {
		self.sub_block.push(byte);
		if self.sub_block.len() == 255 {
			self.flush_sub_block()?;
		}
		Ok(())
	}

	fn flush_sub_block(&mut self) -> std::io::Result<()> {
		if !self.sub_block.is_empty() {
			self.writer.write_all(&[self.sub_block.len() as u8])?;
			self.writer.write_all(&self.sub_block)?;
			self.sub_block.clear();
		}
		Ok(())
	}

	fn write_code(&mut self, code: LzwCode) -> std::io::Result<()> {
		self.buffer |= (code as u32 & code_mask(self.code_bits)) << self.buffer_bits;
		self.buffer_bits += self.code_bits;
		while self.buffer_bits >= 8 {
			self.push_byte((self.buffer & 0xff) as u8)?;
			self.buffer >>= 8;
			self.buffer_bits -= 8;
		}
		Ok(())
	}

	fn finish(mut self) -> std::io::Result<()> {
		if self.buffer_bits > 0 {
			self.push_byte((self.buffer & 0xff) as u8)?;
		}
		self.flush_sub_block()?;
		self.writer.write_all(&[0u8])?;
		Ok(())
	}
}

struct Dictionary {
	table: HashMap<Vec<u8>, LzwCode>,
	next_code: LzwCode,
	min_code_size: u32,
}

impl Dictionary {
	fn new(min_code_size: u32) -> Self {
		let mut dict = Dictionary { table: HashMap::new(), next_code: 0, min_code_size };
		dict.reset();
		dict
	}

	fn reset(&mut self) {
		self.table.clear();
		let size = initial_table_size(self.min_code_size);
		for i in 0..size {
			self.table.insert(vec![i as u8], i as LzwCode);
		}
		self.next_code = size as LzwCode + 2;
	}

	fn clear_code(&self) -> LzwCode {
		initial_table_size(self.min_code_size) as LzwCode + CLEAR_CODE_OFFSET
	}

	fn eoi_code(&self) -> LzwCode {
		initial_table_size(self.min_code_size) as LzwCode + EOI_CODE_OFFSET
	}

	fn is_full(&self) -> bool {
		self.next_code >= (1u16 << MAX_CODE_BITS)
	}
}

/// Tracks the EWMA of consecutive-identical-pixel run lengths and decides when a proactive
/// CLEAR looks worthwhile.
struct RunEwma {
	accumulator: u32,
	current_run: u32,
}

impl RunEwma {
	fn new() -> Self {
		RunEwma { accumulator: 0, current_run: 0 }
	}

	fn observe_repeat(&mut self) {
		self.current_run += 1;
	}

	/// Called when the current run of identical pixels ends (or at end of input); folds the
	/// finished run into the EWMA and resets the run counter.
	fn end_run(&mut self) {
		let sample = (self.current_run.min(1 << 16)) << RUN_EWMA_SHIFT;
		let delta = sample as i64 - self.accumulator as i64;
		self.accumulator = (self.accumulator as i64 + (delta >> RUN_EWMA_SHIFT)) as u32;
		self.current_run = 0;
	}

	/// True once the dictionary has grown enough, and runs have stayed short enough recently,
	/// that clearing now is likely to pay for itself before the table would otherwise fill.
	fn suggests_clear(&self, dictionary_fill: u32) -> bool {
		dictionary_fill > 1 << 9 && self.accumulator < RUN_INV_THRESH
	}
}

/// Encodes `data` (one image's worth of uncompressed pixel indices) as GIF LZW data, including
/// the leading minimum-code-size byte and the sub-block framing, writing the whole thing to
/// `writer`.
pub fn encode<W: Write>(writer: &mut W, data: &[u8], min_code_size: u8) -> std::io::Result<()> {
	let min_code_size = min_code_size.clamp(2, 8) as u32;
	writer.write_all(&[min_code_size as u8])?;

	let mut dictionary = Dictionary::new(min_code_size);
	let mut code_bits = min_code_size + 1;
	let mut bit_writer = BitWriter::new(writer, code_bits);
	bit_writer.write_code(dictionary.clear_code())?;

	if data.is_empty() {
		bit_writer.write_code(dictionary.eoi_code())?;
		return bit_writer.finish();
	}

	let mut run_ewma = RunEwma::new();
	let mut buffer = vec![data[0]];

	for &byte in &data[1..] {
		if byte == *buffer.last().unwrap() {
			run_ewma.observe_repeat();
		} else {
			run_ewma.end_run();
		}

		let mut candidate = buffer.clone();
		candidate.push(byte);

		if dictionary.table.contains_key(&candidate) {
			buffer = candidate;
			continue;
		}

		let code = *dictionary.table.get(&buffer).expect("buffer is always a known code");
		bit_writer.write_code(code)?;

		let new_code = dictionary.next_code;
		dictionary.table.insert(candidate, new_code);
		dictionary.next_code += 1;

		if new_code >= (1u16 << code_bits) - 1 && code_bits < MAX_CODE_BITS {
			code_bits += 1;
			bit_writer.set_code_bits(code_bits);
		}

		if dictionary.is_full() || run_ewma.suggests_clear(dictionary.next_code as u32) {
			bit_writer.write_code(dictionary.clear_code())?;
			dictionary.reset();
			code_bits = min_code_size + 1;
			bit_writer.set_code_bits(code_bits);
		}

		buffer = vec![byte];
	}

	let code = *dictionary.table.get(&buffer).expect("final buffer is always a known code");
	bit_writer.write_code(code)?;
	bit_writer.write_code(dictionary.eoi_code())?;
	bit_writer.finish()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lzw::decoder::decode;
	use std::io::Cursor;

	#[test]
	fn round_trips_through_decoder() {
		let data: Vec<u8> = vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2, 2];
		let mut out = Vec::new();
		encode(&mut out, &data, 2).unwrap();

		let mut cursor = Cursor::new(out);
		let result = decode(&mut cursor).unwrap();
		assert_eq!(data, result.data);
		assert_eq!(0, result.errors);
	}

	#[test]
	fn empty_image_round_trips() {
		let mut out = Vec::new();
		encode(&mut out, &[], 2).unwrap();
		let mut cursor = Cursor::new(out);
		let result = decode(&mut cursor).unwrap();
		assert!(result.data.is_empty());
	}

	#[test]
	fn long_uniform_run_round_trips_across_a_forced_clear() {
		let data = vec![7u8; 5000];
		let mut out = Vec::new();
		encode(&mut out, &data, 8).unwrap();
		let mut cursor = Cursor::new(out);
		let result = decode(&mut cursor).unwrap();
		assert_eq!(data, result.data);
	}
}
