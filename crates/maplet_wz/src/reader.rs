//! Memory-mapped byte cursor for archive files.
//!
//! A [`Reader`] is a cheap cursor over an immutable backing buffer —
//! either a memory-mapped archive file or an owned byte vector (used by
//! tests and by callers that already hold the data). Cloning a reader
//! clones only the cursor; the backing is shared.
//!
//! Readers are single-threaded by design: concurrent consumers clone
//! their own reader over the same backing.
//!
//! # Primitive encodings
//!
//! Beyond fixed-width little-endian primitives the format uses:
//!
//! | Encoding | Scheme |
//! |----------|--------|
//! | compressed int | leading `i8`; `i8::MIN` ⇒ 4-byte LE `i32` follows, else the byte sign-extended |
//! | compressed long | leading `i8`; `i8::MIN` ⇒ 8-byte LE `i64` follows |
//! | compressed float | leading `i8`; `i8::MIN` ⇒ 4-byte LE `f32` follows, else `0.0` |
//! | obfuscated string | length-prefixed, rotating XOR mask + keystream (see [`Reader::read_wz_string`]) |
//! | string block | type byte selecting inline string or string-at-offset |

use std::fs;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::crypto::Keystream;
use crate::error::WzError;

/// Shared immutable backing for a [`Reader`].
#[derive(Clone)]
pub enum Backing {
	/// A memory-mapped file
	Map(Arc<Mmap>),
	/// An owned in-memory buffer
	Mem(Arc<Vec<u8>>),
}

impl Backing {
	/// Returns the backing bytes.
	#[inline]
	pub fn as_slice(&self) -> &[u8] {
		match self {
			Self::Map(map) => map,
			Self::Mem(vec) => vec,
		}
	}
}

impl std::fmt::Debug for Backing {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Map(map) => write!(f, "Backing::Map({} bytes)", map.len()),
			Self::Mem(vec) => write!(f, "Backing::Mem({} bytes)", vec.len()),
		}
	}
}

/// Seekable cursor with typed primitive reads.
#[derive(Debug, Clone)]
pub struct Reader {
	backing: Backing,
	pos: usize,
}

impl Reader {
	/// Memory-maps the file at `path` and returns a cursor at offset 0.
	pub fn open(path: impl AsRef<Path>) -> Result<Self, WzError> {
		let file = fs::File::open(path)?;
		// SAFETY: the archive is opened read-only and treated as immutable
		// for the lifetime of the map; the engine never writes archives.
		#[allow(unsafe_code)]
		let map = unsafe { Mmap::map(&file)? };
		Ok(Self {
			backing: Backing::Map(Arc::new(map)),
			pos: 0,
		})
	}

	/// Wraps an owned buffer.
	pub fn from_vec(data: Vec<u8>) -> Self {
		Self {
			backing: Backing::Mem(Arc::new(data)),
			pos: 0,
		}
	}

	/// Returns the shared backing.
	#[inline]
	pub fn backing(&self) -> &Backing {
		&self.backing
	}

	/// Total length of the backing buffer.
	#[inline]
	pub fn len(&self) -> usize {
		self.backing.as_slice().len()
	}

	/// Returns true if the backing buffer is empty.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Current cursor position.
	#[inline]
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Moves the cursor to an absolute offset.
	#[inline]
	pub fn seek(&mut self, pos: usize) {
		self.pos = pos;
	}

	/// Advances the cursor by `n` bytes.
	#[inline]
	pub fn skip(&mut self, n: usize) {
		self.pos += n;
	}

	/// Number of bytes between the cursor and the end of the backing.
	#[inline]
	pub fn remaining(&self) -> usize {
		self.len().saturating_sub(self.pos)
	}

	/// Borrows `n` bytes at the cursor and advances past them.
	pub fn read_slice(&mut self, n: usize) -> Result<&[u8], WzError> {
		let data = self.backing.as_slice();
		if self.pos + n > data.len() {
			return Err(WzError::Truncated {
				offset: self.pos,
				wanted: n,
				available: data.len().saturating_sub(self.pos),
			});
		}
		let slice = &data[self.pos..self.pos + n];
		self.pos += n;
		Ok(slice)
	}

	/// Copies `n` bytes at the cursor into an owned buffer.
	pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, WzError> {
		Ok(self.read_slice(n)?.to_vec())
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N], WzError> {
		let slice = self.read_slice(N)?;
		let mut out = [0u8; N];
		out.copy_from_slice(slice);
		Ok(out)
	}

	/// Reads one unsigned byte.
	#[inline]
	pub fn read_u8(&mut self) -> Result<u8, WzError> {
		Ok(self.read_array::<1>()?[0])
	}

	/// Reads one signed byte.
	#[inline]
	pub fn read_i8(&mut self) -> Result<i8, WzError> {
		Ok(self.read_u8()? as i8)
	}

	/// Reads a little-endian `u16`.
	#[inline]
	pub fn read_u16(&mut self) -> Result<u16, WzError> {
		Ok(u16::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `i16`.
	#[inline]
	pub fn read_i16(&mut self) -> Result<i16, WzError> {
		Ok(i16::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `u32`.
	#[inline]
	pub fn read_u32(&mut self) -> Result<u32, WzError> {
		Ok(u32::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `i32`.
	#[inline]
	pub fn read_i32(&mut self) -> Result<i32, WzError> {
		Ok(i32::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `u64`.
	#[inline]
	pub fn read_u64(&mut self) -> Result<u64, WzError> {
		Ok(u64::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `i64`.
	#[inline]
	pub fn read_i64(&mut self) -> Result<i64, WzError> {
		Ok(i64::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `f32`.
	#[inline]
	pub fn read_f32(&mut self) -> Result<f32, WzError> {
		Ok(f32::from_le_bytes(self.read_array()?))
	}

	/// Reads a little-endian `f64`.
	#[inline]
	pub fn read_f64(&mut self) -> Result<f64, WzError> {
		Ok(f64::from_le_bytes(self.read_array()?))
	}

	/// Reads a signed compressed integer.
	pub fn read_compressed_i32(&mut self) -> Result<i32, WzError> {
		let lead = self.read_i8()?;
		if lead == i8::MIN {
			self.read_i32()
		} else {
			Ok(i32::from(lead))
		}
	}

	/// Reads a signed compressed long.
	pub fn read_compressed_i64(&mut self) -> Result<i64, WzError> {
		let lead = self.read_i8()?;
		if lead == i8::MIN {
			self.read_i64()
		} else {
			Ok(i64::from(lead))
		}
	}

	/// Reads a compressed float: a non-sentinel lead byte means `0.0`.
	pub fn read_compressed_f32(&mut self) -> Result<f32, WzError> {
		let lead = self.read_i8()?;
		if lead == i8::MIN {
			self.read_f32()
		} else {
			Ok(0.0)
		}
	}

	/// Reads a NUL-terminated narrow string.
	pub fn read_cstring(&mut self) -> Result<String, WzError> {
		let data = self.backing.as_slice();
		let start = self.pos;
		let mut end = start;
		while end < data.len() && data[end] != 0 {
			end += 1;
		}
		if end >= data.len() {
			return Err(WzError::Truncated {
				offset: start,
				wanted: 1,
				available: 0,
			});
		}
		let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&data[start..end]);
		self.pos = end + 1;
		Ok(text.into_owned())
	}

	/// Reads an obfuscated string.
	///
	/// The length prefix selects the character width:
	///
	/// - negative ⇒ 8-bit characters, count `-len` (`-128` ⇒ explicit
	///   `u32` count follows). Each byte is XORed with a rotating mask
	///   starting at `0xAA` and with the keystream byte at its index.
	/// - positive ⇒ UTF-16 characters, count `len` (`127` ⇒ explicit
	///   `u32` count follows). Each unit is XORed with a rotating mask
	///   starting at `0xAAAA` and the 16-bit keystream word at its index.
	/// - zero ⇒ empty string.
	pub fn read_wz_string(&mut self, keystream: &mut Keystream) -> Result<String, WzError> {
		let lead = self.read_i8()?;
		if lead == 0 {
			return Ok(String::new());
		}

		if lead < 0 {
			let len = if lead == i8::MIN {
				self.read_u32()? as usize
			} else {
				(-i32::from(lead)) as usize
			};
			let mut mask = 0xAAu8;
			let mut bytes = self.read_bytes(len)?;
			for (i, byte) in bytes.iter_mut().enumerate() {
				*byte ^= mask ^ keystream.byte_at(i);
				mask = mask.wrapping_add(1);
			}
			let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
			Ok(text.into_owned())
		} else {
			let len = if lead == 127 {
				self.read_u32()? as usize
			} else {
				lead as usize
			};
			let mut mask = 0xAAAAu16;
			let mut units = Vec::with_capacity(len);
			for i in 0..len {
				let raw = self.read_u16()?;
				units.push(raw ^ mask ^ keystream.word_at(i));
				mask = mask.wrapping_add(1);
			}
			Ok(String::from_utf16_lossy(&units))
		}
	}

	/// Reads a type-tagged string block.
	///
	/// Tag `0x00`/`0x73` reads the string inline; tag `0x01`/`0x1B` reads
	/// a `u32` offset relative to `image_base` and fetches the string from
	/// there, restoring the cursor afterwards.
	pub fn read_string_block(
		&mut self,
		keystream: &mut Keystream,
		image_base: usize,
	) -> Result<String, WzError> {
		let tag = self.read_u8()?;
		match tag {
			0x00 | 0x73 => self.read_wz_string(keystream),
			0x01 | 0x1B => {
				let offset = self.read_u32()? as usize;
				let saved = self.pos;
				self.seek(image_base + offset);
				let text = self.read_wz_string(keystream);
				self.seek(saved);
				text
			}
			other => Err(WzError::BadImage(format!(
				"unexpected string block tag 0x{other:02X} at offset {}",
				self.pos - 1
			))),
		}
	}
}
