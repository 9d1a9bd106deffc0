//! Sound payloads.
//!
//! The archive stores audio as an opaque blob behind a small header: a
//! media-type preamble the engine never interprets, a byte length and a
//! duration in milliseconds. Playback is a collaborator's concern; this
//! type only hands out the raw bytes.

use std::rc::Rc;

use crate::reader::Reader;

/// An audio payload referenced by a sound property.
#[derive(Clone)]
pub struct Sound {
	inner: Rc<SoundInner>,
}

struct SoundInner {
	duration_ms: i32,
	header: Vec<u8>,
	data_offset: usize,
	data_len: usize,
	reader: Reader,
}

impl Sound {
	/// Describes a sound payload inside an archive.
	pub fn new(
		duration_ms: i32,
		header: Vec<u8>,
		data_offset: usize,
		data_len: usize,
		reader: Reader,
	) -> Self {
		Self {
			inner: Rc::new(SoundInner {
				duration_ms,
				header,
				data_offset,
				data_len,
				reader,
			}),
		}
	}

	/// Playback duration in milliseconds.
	#[inline]
	pub fn duration_ms(&self) -> i32 {
		self.inner.duration_ms
	}

	/// The undecoded media-type header bytes.
	#[inline]
	pub fn header(&self) -> &[u8] {
		&self.inner.header
	}

	/// Byte length of the payload.
	#[inline]
	pub fn len(&self) -> usize {
		self.inner.data_len
	}

	/// Returns true if the payload is empty.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.inner.data_len == 0
	}

	/// Copies the raw audio bytes out of the archive.
	///
	/// Returns an empty buffer if the recorded range is out of bounds.
	pub fn data(&self) -> Vec<u8> {
		let mut cursor = self.inner.reader.clone();
		cursor.seek(self.inner.data_offset);
		cursor.read_bytes(self.inner.data_len).unwrap_or_default()
	}
}

impl std::fmt::Debug for Sound {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Sound({} bytes, {} ms)", self.inner.data_len, self.inner.duration_ms)
	}
}
