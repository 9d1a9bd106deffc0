#![allow(dead_code)]

//! Synthetic archive builder for integration tests.
//!
//! Produces byte-exact single-file archives through the same primitives
//! the reader consumes: obfuscated strings, compressed ints, the offset
//! cipher and zlib canvas payloads. Tests describe a tree of [`Entry`]
//! and [`Prop`] values and get back the on-disk bytes.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use maplet_wz::crypto::Keystream;
use maplet_wz::source::{encode_offset, version_hash, version_key};

/// A directory-level entry.
pub enum Entry {
	/// Sub-directory with children
	Dir(&'static str, Vec<Entry>),
	/// Image with a property list
	Img(&'static str, Vec<Prop>),
}

/// An image-level property.
pub enum Prop {
	/// Null property
	Null(&'static str),
	/// 16-bit integer
	Int16(&'static str, i16),
	/// 32-bit integer
	Int(&'static str, i32),
	/// 64-bit integer
	Long(&'static str, i64),
	/// 32-bit float
	Float(&'static str, f32),
	/// 64-bit float
	Double(&'static str, f64),
	/// String
	Str(&'static str, &'static str),
	/// 2D vector
	Vector(&'static str, i32, i32),
	/// Nested property list
	Sub(&'static str, Vec<Prop>),
	/// Canvas with an RGBA-format payload (deflated by the builder)
	Canvas {
		/// Property name
		name: &'static str,
		/// Width in pixels
		width: u32,
		/// Height in pixels
		height: u32,
		/// Pixel format code
		format: i32,
		/// Uncompressed pixel payload
		payload: Vec<u8>,
		/// XOR the deflated payload with the keystream
		scrambled: bool,
		/// Child properties (origin, z, links, …)
		children: Vec<Prop>,
	},
	/// Sound payload
	Sound {
		/// Property name
		name: &'static str,
		/// Duration in milliseconds
		duration: i32,
		/// Opaque media header bytes
		header: Vec<u8>,
		/// Audio payload bytes
		data: Vec<u8>,
	},
	/// Symbolic link
	Uol(&'static str, &'static str),
}

/// Builds single-file archives for a fixed version and IV.
pub struct ArchiveBuilder {
	version: u16,
	iv: [u8; 4],
	copyright: &'static str,
}

impl ArchiveBuilder {
	pub fn new(version: u16, iv: [u8; 4]) -> Self {
		Self {
			version,
			iv,
			copyright: "synthetic test archive",
		}
	}

	/// Serializes a root directory into archive bytes.
	pub fn build(&self, entries: &[Entry]) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(b"PKG1");
		out.extend_from_slice(&0u64.to_le_bytes());
		let data_start_pos = out.len();
		out.extend_from_slice(&0u32.to_le_bytes());
		out.extend_from_slice(self.copyright.as_bytes());
		out.push(0);

		let hash = version_hash(self.version);
		out.extend_from_slice(&version_key(hash).to_le_bytes());
		let data_start = out.len() as u32;
		out[data_start_pos..data_start_pos + 4].copy_from_slice(&data_start.to_le_bytes());

		self.write_dir(&mut out, entries, data_start, hash);

		let size = out.len() as u64;
		out[4..12].copy_from_slice(&size.to_le_bytes());
		out
	}

	fn write_dir(&self, out: &mut Vec<u8>, entries: &[Entry], data_start: u32, hash: u32) {
		write_cint(out, entries.len() as i32);

		let mut offset_slots = Vec::with_capacity(entries.len());
		for entry in entries {
			let (tag, name) = match entry {
				Entry::Dir(name, _) => (3u8, *name),
				Entry::Img(name, _) => (4u8, *name),
			};
			out.push(tag);
			self.write_string(out, name);
			write_cint(out, 1); // size
			write_cint(out, 0); // checksum
			offset_slots.push(out.len());
			out.extend_from_slice(&[0u8; 4]);
		}

		for (entry, slot) in entries.iter().zip(offset_slots) {
			let target = out.len() as u32;
			let raw = encode_offset(slot as u32, data_start, hash, target);
			out[slot..slot + 4].copy_from_slice(&raw.to_le_bytes());
			match entry {
				Entry::Dir(_, children) => self.write_dir(out, children, data_start, hash),
				Entry::Img(_, props) => self.write_image(out, props),
			}
		}
	}

	fn write_image(&self, out: &mut Vec<u8>, props: &[Prop]) {
		out.push(0x73);
		self.write_string(out, "Property");
		out.extend_from_slice(&0u16.to_le_bytes());
		self.write_prop_list(out, props);
	}

	fn write_prop_list(&self, out: &mut Vec<u8>, props: &[Prop]) {
		write_cint(out, props.len() as i32);
		for prop in props {
			match prop {
				Prop::Null(name) => {
					self.write_string_block(out, name);
					out.push(0);
				}
				Prop::Int16(name, v) => {
					self.write_string_block(out, name);
					out.push(2);
					out.extend_from_slice(&v.to_le_bytes());
				}
				Prop::Int(name, v) => {
					self.write_string_block(out, name);
					out.push(3);
					write_cint(out, *v);
				}
				Prop::Long(name, v) => {
					self.write_string_block(out, name);
					out.push(20);
					write_clong(out, *v);
				}
				Prop::Float(name, v) => {
					self.write_string_block(out, name);
					out.push(4);
					if *v == 0.0 {
						out.push(0);
					} else {
						out.push(0x80);
						out.extend_from_slice(&v.to_le_bytes());
					}
				}
				Prop::Double(name, v) => {
					self.write_string_block(out, name);
					out.push(5);
					out.extend_from_slice(&v.to_le_bytes());
				}
				Prop::Str(name, v) => {
					self.write_string_block(out, name);
					out.push(8);
					self.write_string_block(out, v);
				}
				Prop::Vector(name, x, y) => {
					self.write_string_block(out, name);
					self.write_extended(out, |b, this| {
						this.write_string_block(b, "Shape2D#Vector2D");
						write_cint(b, *x);
						write_cint(b, *y);
					});
				}
				Prop::Sub(name, children) => {
					self.write_string_block(out, name);
					self.write_extended(out, |b, this| {
						this.write_string_block(b, "Property");
						b.extend_from_slice(&0u16.to_le_bytes());
						this.write_prop_list(b, children);
					});
				}
				Prop::Canvas {
					name,
					width,
					height,
					format,
					payload,
					scrambled,
					children,
				} => {
					self.write_string_block(out, name);
					let mut data = deflate(payload);
					if *scrambled {
						Keystream::new(self.iv).xor_into(&mut data);
					}
					self.write_extended(out, |b, this| {
						this.write_string_block(b, "Canvas");
						b.push(0);
						if children.is_empty() {
							b.push(0);
						} else {
							b.push(1);
							b.extend_from_slice(&0u16.to_le_bytes());
							this.write_prop_list(b, children);
						}
						write_cint(b, *width as i32);
						write_cint(b, *height as i32);
						write_cint(b, *format);
						b.push(0); // scale
						b.extend_from_slice(&0u32.to_le_bytes());
						b.extend_from_slice(&((data.len() + 1) as u32).to_le_bytes());
						b.push(0);
						b.extend_from_slice(&data);
					});
				}
				Prop::Sound {
					name,
					duration,
					header,
					data,
				} => {
					self.write_string_block(out, name);
					self.write_extended(out, |b, this| {
						this.write_string_block(b, "Sound_DX8");
						b.push(0);
						write_cint(b, data.len() as i32);
						write_cint(b, *duration);
						b.extend_from_slice(header);
						b.extend_from_slice(data);
					});
				}
				Prop::Uol(name, target) => {
					self.write_string_block(out, name);
					self.write_extended(out, |b, this| {
						this.write_string_block(b, "UOL");
						b.push(0);
						this.write_string_block(b, target);
					});
				}
			}
		}
	}

	/// Writes type byte 9, the 32-bit block length, then the body.
	fn write_extended(&self, out: &mut Vec<u8>, body: impl FnOnce(&mut Vec<u8>, &Self)) {
		out.push(9);
		let mut block = Vec::new();
		body(&mut block, self);
		out.extend_from_slice(&(block.len() as u32).to_le_bytes());
		out.extend_from_slice(&block);
	}

	/// Inline string block (tag 0).
	fn write_string_block(&self, out: &mut Vec<u8>, text: &str) {
		out.push(0);
		self.write_string(out, text);
	}

	/// Narrow obfuscated string: rotating mask plus keystream.
	fn write_string(&self, out: &mut Vec<u8>, text: &str) {
		let bytes = text.as_bytes();
		if bytes.is_empty() {
			out.push(0);
			return;
		}
		if bytes.len() < 128 {
			out.push((-(bytes.len() as i32)) as i8 as u8);
		} else {
			out.push(0x80);
			out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
		}
		let mut keystream = Keystream::new(self.iv);
		let mut mask = 0xAAu8;
		for (i, byte) in bytes.iter().enumerate() {
			out.push(byte ^ mask ^ keystream.byte_at(i));
			mask = mask.wrapping_add(1);
		}
	}
}

/// Compressed-int encoding: single byte unless out of the i8 range.
pub fn write_cint(out: &mut Vec<u8>, v: i32) {
	if (-127..=127).contains(&v) {
		out.push(v as i8 as u8);
	} else {
		out.push(0x80);
		out.extend_from_slice(&v.to_le_bytes());
	}
}

/// Compressed-long encoding.
pub fn write_clong(out: &mut Vec<u8>, v: i64) {
	if (-127..=127).contains(&v) {
		out.push(v as i8 as u8);
	} else {
		out.push(0x80);
		out.extend_from_slice(&v.to_le_bytes());
	}
}

/// Deflates a payload the way canvas data is stored.
pub fn deflate(data: &[u8]) -> Vec<u8> {
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(data).unwrap();
	encoder.finish().unwrap()
}
