//! Cryptographic primitives for the packaged asset store.
//!
//! Three pieces live here:
//!
//! - [`aes`]: a self-contained AES-256 block encryptor. The archive never
//!   decrypts anything with AES directly; the cipher only feeds the
//!   keystream generator.
//! - [`Keystream`]: the deterministic XOR pad derived from a region IV,
//!   used to unmask obfuscated strings and scrambled canvas payloads.
//! - [`inflate`]: a tolerant zlib wrapper that mirrors the original
//!   engine's "best effort" decompression discipline.
//!
//! All functions here are total: corrupt input produces empty or zeroed
//! output rather than an error. Callers on the load path treat an empty
//! result as "asset not loaded" and keep going.

pub mod aes;
pub mod keystream;

pub use keystream::{BATCH_SIZE, Keystream};

use flate2::{Decompress, FlushDecompress, Status};

/// The fixed 32-byte archive key.
///
/// Only every fourth byte carries entropy; the original client ships the
/// key in this stretched form and we keep it byte-identical so keystreams
/// match the production data.
pub const ARCHIVE_KEY: [u8; 32] = [
	0x13, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0xB4, 0x00, 0x00, 0x00,
	0x1B, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00, 0x33, 0x00, 0x00, 0x00, 0x52, 0x00, 0x00, 0x00,
];

/// Region IV for archives that carry unscrambled payloads.
pub const IV_ZERO: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Region IV used by the global-service archives.
pub const IV_GLOBAL: [u8; 4] = [0x4D, 0x23, 0xC7, 0x2B];

/// Region IV used by the Korea/Europe-service archives.
pub const IV_EAST: [u8; 4] = [0xB9, 0x7D, 0x63, 0xE9];

/// Inflates a zlib stream into a buffer of known expected size.
///
/// The original engine's loader does not require the stream end marker:
/// decompression stops as soon as either the input is exhausted or the
/// output has reached `expected` bytes, and whatever was produced (zero
/// padded to `expected`) is the result. Two fallbacks cover the data
/// quirks observed in production archives:
///
/// - a payload whose compressed length equals the expected length is
///   treated as stored, uncompressed data;
/// - anything else that fails to decompress yields an empty buffer, which
///   the canvas layer treats as "unloaded".
pub fn inflate(data: &[u8], expected: usize) -> Vec<u8> {
	if expected == 0 {
		return Vec::new();
	}

	let mut out = vec![0u8; expected];
	let mut inflater = Decompress::new(true);

	loop {
		let consumed = inflater.total_in() as usize;
		let produced = inflater.total_out() as usize;
		if produced >= expected || consumed >= data.len() {
			return out;
		}

		let status = inflater.decompress(
			&data[consumed..],
			&mut out[produced..],
			FlushDecompress::Sync,
		);
		match status {
			Ok(Status::StreamEnd) => return out,
			Ok(Status::Ok) => {}
			Ok(Status::BufError) => {
				// Neither input nor output can advance; accept what we have.
				return out;
			}
			Err(_) => {
				if data.len() == expected {
					return data.to_vec();
				}
				return Vec::new();
			}
		}
	}
}

/// Returns true if the two leading payload bytes form a zlib header.
///
/// Canvas payloads that do *not* start with a zlib header are scrambled
/// with the keystream and must be XOR-unmasked before inflating.
#[inline]
pub fn has_zlib_header(data: &[u8]) -> bool {
	if data.len() < 2 {
		return false;
	}
	let header = u16::from_le_bytes([data[0], data[1]]);
	header == 0x9C78 || header == 0xDA78
}
