//! AES-derived XOR keystream.
//!
//! Every obfuscated string and every scrambled canvas payload in an archive
//! is XORed against the same deterministic byte sequence: the 4-byte region
//! initialization vector is tiled into a 16-byte block, and that block is
//! encrypted over and over with the fixed archive key. The concatenated
//! ciphertext blocks form the keystream.
//!
//! The stream grows lazily in fixed batches so that a request for byte `i`
//! is always served from memory; a batch is only computed once, which makes
//! `byte_at` independent of access order.

use super::aes::Aes256;
use super::ARCHIVE_KEY;

/// Keystream growth quantum in bytes.
///
/// Inherited from the original engine; a different batch size only changes
/// the memory footprint, never the stream contents.
pub const BATCH_SIZE: usize = 0x1_0000;

/// Growable XOR pad derived from a 4-byte initialization vector.
pub struct Keystream {
	cipher: Aes256,
	last_block: [u8; 16],
	buf: Vec<u8>,
}

impl Keystream {
	/// Creates a keystream for the given region IV.
	pub fn new(iv: [u8; 4]) -> Self {
		let mut last_block = [0u8; 16];
		for (i, byte) in last_block.iter_mut().enumerate() {
			*byte = iv[i % 4];
		}
		Self {
			cipher: Aes256::new(&ARCHIVE_KEY),
			last_block,
			buf: Vec::new(),
		}
	}

	/// Number of keystream bytes generated so far.
	#[inline]
	pub fn len(&self) -> usize {
		self.buf.len()
	}

	/// Returns true if no batch has been generated yet.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Grows the stream until at least `size` bytes are available.
	pub fn ensure(&mut self, size: usize) {
		while self.buf.len() < size {
			self.buf.reserve(BATCH_SIZE);
			let target = self.buf.len() + BATCH_SIZE;
			while self.buf.len() < target {
				self.cipher.encrypt_block(&mut self.last_block);
				self.buf.extend_from_slice(&self.last_block);
			}
		}
	}

	/// Returns keystream byte `i`, generating batches as needed.
	#[inline]
	pub fn byte_at(&mut self, i: usize) -> u8 {
		self.ensure(i + 1);
		self.buf[i]
	}

	/// Returns keystream bytes `2*i .. 2*i+2` as a little-endian word.
	///
	/// Used for the UTF-16 string mask, which consumes the stream two
	/// bytes per character.
	#[inline]
	pub fn word_at(&mut self, i: usize) -> u16 {
		self.ensure(2 * i + 2);
		u16::from_le_bytes([self.buf[2 * i], self.buf[2 * i + 1]])
	}

	/// XORs `data` in place against the keystream starting at stream offset 0.
	pub fn xor_into(&mut self, data: &mut [u8]) {
		self.ensure(data.len());
		for (i, byte) in data.iter_mut().enumerate() {
			*byte ^= self.buf[i];
		}
	}
}

impl std::fmt::Debug for Keystream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Keystream({} bytes buffered)", self.buf.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_byte_at_is_order_independent() {
		let mut forward = Keystream::new([0x4D, 0x23, 0xC7, 0x2B]);
		let mut backward = Keystream::new([0x4D, 0x23, 0xC7, 0x2B]);

		let fwd: Vec<u8> = (0..64).map(|i| forward.byte_at(i)).collect();
		let bwd: Vec<u8> = (0..64).rev().map(|i| backward.byte_at(i)).collect();
		let bwd: Vec<u8> = bwd.into_iter().rev().collect();
		assert_eq!(fwd, bwd);
	}

	#[test]
	fn test_repeat_access_is_stable() {
		let mut ks = Keystream::new([0xB9, 0x7D, 0x63, 0xE9]);
		let first = ks.byte_at(1000);
		let again = ks.byte_at(1000);
		assert_eq!(first, again);
	}

	#[test]
	fn test_grows_in_batches() {
		let mut ks = Keystream::new([0, 0, 0, 0]);
		assert_eq!(ks.len(), 0);
		ks.byte_at(0);
		assert_eq!(ks.len(), BATCH_SIZE);
		ks.byte_at(BATCH_SIZE);
		assert_eq!(ks.len(), 2 * BATCH_SIZE);
	}

	#[test]
	fn test_different_ivs_differ() {
		let mut a = Keystream::new([0x4D, 0x23, 0xC7, 0x2B]);
		let mut b = Keystream::new([0xB9, 0x7D, 0x63, 0xE9]);
		let va: Vec<u8> = (0..16).map(|i| a.byte_at(i)).collect();
		let vb: Vec<u8> = (0..16).map(|i| b.byte_at(i)).collect();
		assert_ne!(va, vb);
	}

	#[test]
	fn test_xor_roundtrip() {
		let mut ks = Keystream::new([1, 2, 3, 4]);
		let plain = b"the quick brown fox".to_vec();
		let mut data = plain.clone();
		ks.xor_into(&mut data);
		assert_ne!(data, plain);
		ks.xor_into(&mut data);
		assert_eq!(data, plain);
	}
}
