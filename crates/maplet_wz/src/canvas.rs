//! Canvas surfaces.
//!
//! A [`Canvas`] is the pixel payload of a canvas property. Until first
//! access it only carries the description of the on-disk payload (format,
//! scale, scrambled flag, offset and length inside the archive); the
//! decoded RGBA surface is produced on demand and cached.

use std::cell::RefCell;
use std::rc::Rc;

use crate::crypto::{self, Keystream};
use crate::pixel;
use crate::reader::Reader;

/// A lazily decoded pixel surface.
///
/// Cloning is cheap; clones share the payload description and the decoded
/// pixel cache.
#[derive(Clone)]
pub struct Canvas {
	inner: Rc<CanvasInner>,
}

struct CanvasInner {
	width: u32,
	height: u32,
	format: i32,
	scale: u8,
	scrambled: bool,
	data_offset: usize,
	data_len: usize,
	reader: Option<Reader>,
	keystream: Option<Rc<RefCell<Keystream>>>,
	pixels: RefCell<Option<Rc<Vec<u8>>>>,
}

impl Canvas {
	/// Describes an undecoded archive payload.
	#[allow(clippy::too_many_arguments)]
	pub fn from_archive(
		width: u32,
		height: u32,
		format: i32,
		scale: u8,
		scrambled: bool,
		data_offset: usize,
		data_len: usize,
		reader: Reader,
		keystream: Rc<RefCell<Keystream>>,
	) -> Self {
		Self {
			inner: Rc::new(CanvasInner {
				width,
				height,
				format,
				scale,
				scrambled,
				data_offset,
				data_len,
				reader: Some(reader),
				keystream: Some(keystream),
				pixels: RefCell::new(None),
			}),
		}
	}

	/// Wraps an already decoded RGBA8 surface.
	///
	/// Used by compositors for surfaces they render themselves.
	///
	/// # Panics
	///
	/// Panics if the buffer is not exactly `width * height * 4` bytes.
	pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Self {
		assert_eq!(
			pixels.len(),
			(width as usize) * (height as usize) * 4,
			"RGBA buffer size mismatch"
		);
		Self {
			inner: Rc::new(CanvasInner {
				width,
				height,
				format: pixel::FORMAT_ARGB8888,
				scale: 0,
				scrambled: false,
				data_offset: 0,
				data_len: 0,
				reader: None,
				keystream: None,
				pixels: RefCell::new(Some(Rc::new(pixels))),
			}),
		}
	}

	/// Canvas width in pixels.
	#[inline]
	pub fn width(&self) -> u32 {
		self.inner.width
	}

	/// Canvas height in pixels.
	#[inline]
	pub fn height(&self) -> u32 {
		self.inner.height
	}

	/// Pixel format code of the stored payload.
	#[inline]
	pub fn format(&self) -> i32 {
		self.inner.format
	}

	/// Scale exponent of the stored payload.
	#[inline]
	pub fn scale(&self) -> u8 {
		self.inner.scale
	}

	/// True if the payload is XOR-scrambled with the keystream.
	#[inline]
	pub fn is_scrambled(&self) -> bool {
		self.inner.scrambled
	}

	/// Returns the decoded RGBA8 surface, decoding on first access.
	///
	/// The buffer is exactly `width * height * 4` bytes, or empty if the
	/// payload could not be decoded. The result is cached; two calls
	/// return the same buffer.
	pub fn pixels(&self) -> Rc<Vec<u8>> {
		if let Some(cached) = self.inner.pixels.borrow().as_ref() {
			return Rc::clone(cached);
		}

		let decoded = Rc::new(self.decode());
		*self.inner.pixels.borrow_mut() = Some(Rc::clone(&decoded));
		decoded
	}

	/// True if a decoded surface is available (or already cached).
	pub fn is_loaded(&self) -> bool {
		self.inner
			.pixels
			.borrow()
			.as_ref()
			.is_some_and(|p| !p.is_empty())
	}

	fn decode(&self) -> Vec<u8> {
		let (Some(reader), Some(keystream)) = (&self.inner.reader, &self.inner.keystream) else {
			return Vec::new();
		};

		let mut cursor = reader.clone();
		cursor.seek(self.inner.data_offset);
		let Ok(mut raw) = cursor.read_bytes(self.inner.data_len) else {
			log::warn!(
				"canvas payload out of bounds at offset {} (+{})",
				self.inner.data_offset,
				self.inner.data_len
			);
			return Vec::new();
		};

		if self.inner.scrambled {
			keystream.borrow_mut().xor_into(&mut raw);
		}

		let expected = pixel::expected_len(
			self.inner.format,
			self.inner.scale,
			self.inner.width,
			self.inner.height,
		);
		let inflated = crypto::inflate(&raw, expected);
		pixel::decode(
			self.inner.format,
			self.inner.scale,
			self.inner.width,
			self.inner.height,
			&inflated,
		)
	}
}

impl std::fmt::Debug for Canvas {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"Canvas({}×{}, format {}, {})",
			self.inner.width,
			self.inner.height,
			self.inner.format,
			if self.is_loaded() { "decoded" } else { "cold" }
		)
	}
}
