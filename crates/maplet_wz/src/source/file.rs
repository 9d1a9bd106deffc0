//! Legacy single-file archive parsing.
//!
//! # File layout
//!
//! ```text
//! Offset      Size  Field
//! ----------  ----  --------------------------------------------------
//! 0x00        4     Magic "PKG1"
//! 0x04        8     File size (u64 LE)
//! 0x0C        4     Data start offset (u32 LE)
//! 0x10        var   Copyright, NUL terminated
//! start - 2   2     Encrypted version (u16 LE)
//! start       var   Root directory
//! ```
//!
//! The version is never stored in the clear. The opener brute-forces
//! candidates `0..=0x7FFE`: each candidate's decimal rendering is folded
//! into a 32-bit hash (`acc = acc * 32 + ch + 1`), the hash bytes are
//! XOR-folded against `0xFF`, and the result is compared with the stored
//! encrypted version. Matching candidates are verified by test-parsing
//! the root directory, since the 8-bit check admits collisions. Archives
//! from the 64-bit era dropped the field entirely and always use version
//! 777; the opener falls back to that when the probe exhausts.
//!
//! # Directory entries
//!
//! A directory is a compressed-int count followed by tagged entries:
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | 1   | reserved, 10 bytes skipped |
//! | 2   | name stored at `start + u32`, re-tagged at that offset |
//! | 3   | sub-directory, name inline |
//! | 4   | image, name inline |
//!
//! Tags 2–4 carry a compressed size, a compressed checksum and an
//! encoded file offset (see [`decode_offset`]). Sub-directories are
//! parsed eagerly; images get a lazy-load hook and are parsed on first
//! access.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{error, warn};
use serde::Serialize;

use crate::canvas::Canvas;
use crate::crypto::{self, Keystream};
use crate::error::WzError;
use crate::node::{Blob, ImageLoader, LoadHook, Node, Value};
use crate::reader::Reader;
use crate::sound::Sound;

use super::{PathResolver, SourceInfo, SourceOptions, split_link_path};

/// Archive magic tag.
pub const MAGIC: &[u8; 4] = b"PKG1";

/// Constant folded into the offset cipher.
pub const OFFSET_KEY: u32 = 0x581C_3F6D;

/// Highest version candidate tried by the probe.
const VERSION_PROBE_END: u16 = 0x7FFE;

/// Version assumed by archives without an embedded version field.
const VERSION_64BIT: u16 = 777;

/// Image signature byte preceding the `Property` literal.
const PROPERTY_SIGNATURE: u8 = 0x73;

/// Parse recursion guard for hostile data.
const MAX_DEPTH: u32 = 32;

// Directory entry tags
const ENTRY_RESERVED: u8 = 1;
const ENTRY_REFERENCE: u8 = 2;
const ENTRY_DIRECTORY: u8 = 3;
const ENTRY_IMAGE: u8 = 4;

// Property type bytes
const PROP_NULL: u8 = 0;
const PROP_INT16: u8 = 2;
const PROP_INT16_ALIAS: u8 = 0x0B;
const PROP_INT: u8 = 3;
const PROP_INT_ALIAS: u8 = 19;
const PROP_FLOAT: u8 = 4;
const PROP_DOUBLE: u8 = 5;
const PROP_STRING: u8 = 8;
const PROP_EXTENDED: u8 = 9;
const PROP_LONG: u8 = 20;

/// Physical layout of a single-file archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layout {
	/// Classic archive with an embedded encrypted version
	Legacy,
	/// 64-bit era archive; version fixed at 777
	Legacy64,
	/// Directory-shard package (reported by package sources)
	Package,
}

/// Folds a version number's decimal rendering into the offset-cipher hash.
pub fn version_hash(version: u16) -> u32 {
	let mut acc = 0u32;
	for ch in version.to_string().bytes() {
		acc = acc.wrapping_mul(32).wrapping_add(u32::from(ch)).wrapping_add(1);
	}
	acc
}

/// Derives the stored encrypted version from a version hash.
pub fn version_key(hash: u32) -> u16 {
	let [b0, b1, b2, b3] = hash.to_le_bytes();
	u16::from(0xFFu8 ^ b0 ^ b1 ^ b2 ^ b3)
}

/// Decodes an encoded 32-bit offset at the reader's position.
///
/// The cipher mixes the entry position, the data-start offset and the
/// version hash, so an offset only decodes under the correct version.
pub fn decode_offset(reader: &mut Reader, data_start: u32, hash: u32) -> Result<u32, WzError> {
	let pos = reader.pos() as u32;
	let raw = reader.read_u32()?;
	let mut key = (!(pos.wrapping_sub(data_start)))
		.wrapping_mul(hash)
		.wrapping_sub(OFFSET_KEY);
	key = key.rotate_left(key & 0x1F);
	Ok((key ^ raw).wrapping_add(data_start.wrapping_mul(2)))
}

/// Inverse of [`decode_offset`]: produces the raw bytes that decode to
/// `target` when read at `entry_pos`. Exercised by the synthetic-archive
/// test builder.
pub fn encode_offset(entry_pos: u32, data_start: u32, hash: u32, target: u32) -> u32 {
	let mut key = (!(entry_pos.wrapping_sub(data_start)))
		.wrapping_mul(hash)
		.wrapping_sub(OFFSET_KEY);
	key = key.rotate_left(key & 0x1F);
	key ^ target.wrapping_sub(data_start.wrapping_mul(2))
}

struct FileInner {
	name: String,
	path: PathBuf,
	reader: Reader,
	data_start: u32,
	version: u16,
	version_hash: u32,
	layout: Layout,
	copyright: String,
	keystream: Rc<RefCell<Keystream>>,
	root: Node,
	resolver: RefCell<Weak<dyn PathResolver>>,
}

/// An opened legacy single-file archive.
///
/// Cheap to clone; clones share the mapped file and the parsed tree.
#[derive(Clone)]
pub struct FileSource {
	inner: Rc<FileInner>,
}

impl FileSource {
	/// Opens and parses the archive at `path`.
	///
	/// The directory tree is built eagerly; image subtrees load lazily.
	pub fn open(path: impl AsRef<Path>, name: &str, options: SourceOptions) -> Result<Self, WzError> {
		let path = path.as_ref();
		let reader = Reader::open(path)?;
		Self::from_reader(reader, path.to_path_buf(), name, options)
	}

	/// Opens an archive from an in-memory buffer.
	pub fn open_bytes(data: Vec<u8>, name: &str, options: SourceOptions) -> Result<Self, WzError> {
		Self::from_reader(Reader::from_vec(data), PathBuf::new(), name, options)
	}

	fn from_reader(
		reader: Reader,
		path: PathBuf,
		name: &str,
		options: SourceOptions,
	) -> Result<Self, WzError> {
		let mut header = reader.clone();
		let magic = header.read_bytes(4)?;
		if magic.as_slice() != MAGIC.as_slice() {
			return Err(WzError::MalformedArchive(format!(
				"bad magic {magic:02X?} in '{}'",
				path.display()
			)));
		}
		let _file_size = header.read_u64()?;
		let data_start = header.read_u32()?;
		if (data_start as usize) < 20 || (data_start as usize) > reader.len() {
			return Err(WzError::MalformedArchive(format!(
				"data start 0x{data_start:X} out of range"
			)));
		}
		let copyright = header.read_cstring().unwrap_or_default();

		let mut version_reader = reader.clone();
		version_reader.seek(data_start as usize - 2);
		let encrypted_version = version_reader.read_u16()?;

		let keystream = Rc::new(RefCell::new(Keystream::new(options.iv)));

		let mut resolved = None;
		for version in 0..=VERSION_PROBE_END {
			let hash = version_hash(version);
			if version_key(hash) != encrypted_version {
				continue;
			}
			if validate_directory(&reader, data_start, hash, &keystream) {
				resolved = Some((version, hash, Layout::Legacy));
				break;
			}
		}
		if resolved.is_none() {
			// 64-bit era archives carry no version; they are all 777.
			let hash = version_hash(VERSION_64BIT);
			if validate_directory(&reader, data_start, hash, &keystream) {
				resolved = Some((VERSION_64BIT, hash, Layout::Legacy64));
			}
		}
		let Some((version, hash, layout)) = resolved else {
			return Err(WzError::BadVersion {
				probed: u32::from(VERSION_PROBE_END) + 1,
			});
		};

		let root = Node::directory(name);
		let source = Self {
			inner: Rc::new(FileInner {
				name: name.to_owned(),
				path,
				reader,
				data_start,
				version,
				version_hash: hash,
				layout,
				copyright,
				keystream,
				root: root.clone(),
				resolver: RefCell::new(Weak::<PackageStub>::new()),
			}),
		};

		let mut cursor = source.inner.reader.clone();
		cursor.seek(data_start as usize);
		source.parse_directory(&root, &mut cursor, 0)?;
		Ok(source)
	}

	/// Archive name (also the root node name).
	#[inline]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Root directory node.
	#[inline]
	pub fn root(&self) -> Node {
		self.inner.root.clone()
	}

	/// Decoded version number.
	#[inline]
	pub fn version(&self) -> u16 {
		self.inner.version
	}

	/// Hash of the decoded version, as used by the offset cipher.
	#[inline]
	pub fn hash(&self) -> u32 {
		self.inner.version_hash
	}

	/// Copyright string from the header.
	#[inline]
	pub fn copyright(&self) -> &str {
		&self.inner.copyright
	}

	/// Physical layout detected at open time.
	#[inline]
	pub fn layout(&self) -> Layout {
		self.inner.layout
	}

	/// Path the archive was opened from (empty for in-memory archives).
	#[inline]
	pub fn file_path(&self) -> &Path {
		&self.inner.path
	}

	/// Summary for diagnostics.
	pub fn info(&self) -> SourceInfo {
		SourceInfo {
			name: self.inner.name.clone(),
			layout: self.inner.layout,
			version: self.inner.version,
			shards: 1,
		}
	}

	/// Wires the upward link resolver.
	pub fn set_resolver(&self, resolver: Weak<dyn PathResolver>) {
		*self.inner.resolver.borrow_mut() = resolver;
	}

	fn parse_directory(&self, parent: &Node, reader: &mut Reader, depth: u32) -> Result<(), WzError> {
		if depth > MAX_DEPTH {
			return Err(WzError::MalformedArchive("directory nesting too deep".into()));
		}
		let inner = &self.inner;
		let count = reader.read_compressed_i32()?;
		if count < 0 {
			return Err(WzError::MalformedArchive(format!("negative entry count {count}")));
		}

		for _ in 0..count {
			let mut tag = reader.read_u8()?;
			let name = match tag {
				ENTRY_RESERVED => {
					reader.skip(10);
					continue;
				}
				ENTRY_REFERENCE => {
					let name_offset = reader.read_u32()?;
					let saved = reader.pos();
					reader.seek(inner.data_start as usize + name_offset as usize);
					tag = reader.read_u8()?;
					if tag != ENTRY_DIRECTORY && tag != ENTRY_IMAGE {
						return Err(WzError::MalformedArchive(format!(
							"referenced entry re-dispatches to tag {tag}"
						)));
					}
					let name = reader.read_wz_string(&mut inner.keystream.borrow_mut())?;
					reader.seek(saved);
					name
				}
				ENTRY_DIRECTORY | ENTRY_IMAGE => {
					reader.read_wz_string(&mut inner.keystream.borrow_mut())?
				}
				other => {
					return Err(WzError::MalformedArchive(format!(
						"unexpected directory entry tag {other} at offset {}",
						reader.pos() - 1
					)));
				}
			};

			let size = reader.read_compressed_i32()?;
			let _checksum = reader.read_compressed_i32()?;
			let offset = decode_offset(reader, inner.data_start, inner.version_hash)?;
			if (offset as usize) > reader.len() {
				return Err(WzError::MalformedArchive(format!(
					"entry '{name}' offset 0x{offset:X} out of range"
				)));
			}

			match tag {
				ENTRY_DIRECTORY => {
					let dir = Node::directory(name);
					parent.append_child(dir.clone());
					let mut sub = reader.clone();
					sub.seek(offset as usize);
					self.parse_directory(&dir, &mut sub, depth + 1)?;
				}
				ENTRY_IMAGE => {
					let image = Node::image(name);
					let inner: Rc<dyn ImageLoader> = self.inner.clone();
					let loader: Weak<dyn ImageLoader> = Rc::downgrade(&inner);
					image.set_load_hook(LoadHook::new(loader, offset as usize, size.max(0) as usize));
					parent.append_child(image);
				}
				_ => unreachable!("tag narrowed above"),
			}
		}
		Ok(())
	}
}

impl std::fmt::Debug for FileSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"FileSource('{}', {:?}, v{})",
			self.inner.name, self.inner.layout, self.inner.version
		)
	}
}

/// Placeholder resolver type used to create an empty `Weak`.
struct PackageStub;

impl PathResolver for PackageStub {
	fn resolve_path(&self, _path: &str) -> Option<Node> {
		None
	}
}

impl FileInner {
	fn parse_image(&self, node: &Node, reader: &mut Reader) -> Result<(), WzError> {
		let image_base = reader.pos();
		let signature = reader.read_u8()?;
		let literal = reader.read_wz_string(&mut self.keystream.borrow_mut())?;
		let reserved = reader.read_u16()?;
		if signature != PROPERTY_SIGNATURE || literal != "Property" || reserved != 0 {
			return Err(WzError::BadImage(format!(
				"image '{}' has no property signature",
				node.name()
			)));
		}
		self.parse_property_list(node, reader, image_base, 0)
	}

	fn parse_property_list(
		&self,
		parent: &Node,
		reader: &mut Reader,
		image_base: usize,
		depth: u32,
	) -> Result<(), WzError> {
		if depth > MAX_DEPTH {
			return Err(WzError::BadImage("property nesting too deep".into()));
		}
		let count = reader.read_compressed_i32()?;
		if count < 0 {
			return Err(WzError::BadImage(format!("negative property count {count}")));
		}

		for _ in 0..count {
			let name = reader.read_string_block(&mut self.keystream.borrow_mut(), image_base)?;
			let type_byte = reader.read_u8()?;
			match type_byte {
				PROP_NULL => parent.append_child(Node::new(name, Value::Null)),
				PROP_INT16 | PROP_INT16_ALIAS => {
					parent.append_child(Node::new(name, Value::Int16(reader.read_i16()?)));
				}
				PROP_INT | PROP_INT_ALIAS => {
					parent.append_child(Node::new(name, Value::Int(reader.read_compressed_i32()?)));
				}
				PROP_LONG => {
					parent.append_child(Node::new(name, Value::Long(reader.read_compressed_i64()?)));
				}
				PROP_FLOAT => {
					parent.append_child(Node::new(name, Value::Float(reader.read_compressed_f32()?)));
				}
				PROP_DOUBLE => {
					parent.append_child(Node::new(name, Value::Double(reader.read_f64()?)));
				}
				PROP_STRING => {
					let text =
						reader.read_string_block(&mut self.keystream.borrow_mut(), image_base)?;
					parent.append_child(Node::new(name, Value::String(text)));
				}
				PROP_EXTENDED => {
					let block_len = reader.read_u32()? as usize;
					let block_end = reader.pos() + block_len;
					let child = Node::new(name, Value::Null);
					parent.append_child(child.clone());
					if let Err(err) = self.parse_extended(&child, reader, image_base, block_end, depth)
					{
						warn!("skipping malformed block '{}': {err}", child.path());
					}
					reader.seek(block_end);
				}
				other => {
					return Err(WzError::BadImage(format!(
						"unknown property type {other} for '{name}'"
					)));
				}
			}
		}
		Ok(())
	}

	fn parse_extended(
		&self,
		node: &Node,
		reader: &mut Reader,
		image_base: usize,
		block_end: usize,
		depth: u32,
	) -> Result<(), WzError> {
		let type_name = reader.read_string_block(&mut self.keystream.borrow_mut(), image_base)?;
		match type_name.as_str() {
			"Property" => {
				node.set_value(Value::SubProperty);
				reader.skip(2);
				self.parse_property_list(node, reader, image_base, depth + 1)?;
			}
			"Canvas" => self.parse_canvas(node, reader, image_base, block_end, depth)?,
			"Shape2D#Vector2D" => {
				let x = reader.read_compressed_i32()?;
				let y = reader.read_compressed_i32()?;
				node.set_value(Value::Vector(x, y));
			}
			"Shape2D#Convex2D" => {
				let count = reader.read_compressed_i32()?.max(0);
				let mut points = Vec::with_capacity(count as usize);
				for _ in 0..count {
					let entry_type =
						reader.read_string_block(&mut self.keystream.borrow_mut(), image_base)?;
					if entry_type != "Shape2D#Vector2D" {
						return Err(WzError::BadImage(format!(
							"convex entry has type '{entry_type}'"
						)));
					}
					let x = reader.read_compressed_i32()?;
					let y = reader.read_compressed_i32()?;
					points.push((x, y));
				}
				node.set_value(Value::Convex(points));
			}
			"Sound_DX8" => self.parse_sound(node, reader, block_end)?,
			"UOL" => {
				reader.skip(1);
				let target = reader.read_string_block(&mut self.keystream.borrow_mut(), image_base)?;
				node.set_value(Value::Uol(target));
			}
			"RawData" => {
				reader.skip(1);
				let len = reader.read_u32()? as usize;
				node.set_value(Value::Raw(Blob::new(type_name, reader.pos(), len, reader.clone())));
			}
			"Video" => {
				reader.skip(1);
				let len = reader.read_u32()? as usize;
				node.set_value(Value::Video(Blob::new(type_name, reader.pos(), len, reader.clone())));
			}
			other => {
				return Err(WzError::BadImage(format!("unknown extended type '{other}'")));
			}
		}
		Ok(())
	}

	fn parse_canvas(
		&self,
		node: &Node,
		reader: &mut Reader,
		image_base: usize,
		block_end: usize,
		depth: u32,
	) -> Result<(), WzError> {
		reader.skip(1);
		if reader.read_u8()? == 1 {
			reader.skip(2);
			self.parse_property_list(node, reader, image_base, depth + 1)?;
		}
		let width = reader.read_compressed_i32()?.max(0) as u32;
		let height = reader.read_compressed_i32()?.max(0) as u32;
		let format = reader.read_compressed_i32()?;
		let scale = reader.read_u8()?;
		reader.skip(4);
		let raw_len = reader.read_u32()? as usize;
		reader.skip(1);
		let data_len = raw_len.saturating_sub(1);
		let data_offset = reader.pos();
		if data_offset + data_len > block_end {
			return Err(WzError::BadImage(format!(
				"canvas payload overruns its block by {} bytes",
				data_offset + data_len - block_end
			)));
		}

		let mut peek = reader.clone();
		let scrambled = match peek.read_bytes(2) {
			Ok(header) => !crypto::has_zlib_header(&header),
			Err(_) => false,
		};

		node.set_value(Value::Canvas(Canvas::from_archive(
			width,
			height,
			format,
			scale,
			scrambled,
			data_offset,
			data_len,
			self.reader.clone(),
			Rc::clone(&self.keystream),
		)));
		Ok(())
	}

	fn parse_sound(&self, node: &Node, reader: &mut Reader, block_end: usize) -> Result<(), WzError> {
		reader.skip(1);
		let data_len = reader.read_compressed_i32()?.max(0) as usize;
		let duration = reader.read_compressed_i32()?;
		let data_offset = block_end.saturating_sub(data_len);
		let header_len = data_offset.saturating_sub(reader.pos());
		let header = reader.read_bytes(header_len)?;
		node.set_value(Value::Sound(Sound::new(
			duration,
			header,
			data_offset,
			data_len,
			self.reader.clone(),
		)));
		Ok(())
	}
}

impl ImageLoader for FileInner {
	fn load_image(&self, node: &Node, offset: usize, _size: usize) {
		let mut reader = self.reader.clone();
		reader.seek(offset);
		if let Err(err) = self.parse_image(node, &mut reader) {
			// The node stays empty-but-loaded; rendering tolerates it.
			error!("failed to load image '{}': {err}", node.path());
		}
	}

	fn resolve_outlink(&self, path: &str) -> Option<Node> {
		let (archive, rest) = split_link_path(path);
		if archive == self.name
			&& let Some(node) = self.root.descend(rest)
		{
			return Some(node);
		}
		self.resolver.borrow().upgrade()?.resolve_path(path)
	}
}

/// Cheap structural check used to verify a version-hash candidate: walk
/// the top-level directory and confirm every entry decodes to a sane tag
/// and an in-bounds offset.
fn validate_directory(
	reader: &Reader,
	data_start: u32,
	hash: u32,
	keystream: &Rc<RefCell<Keystream>>,
) -> bool {
	let mut cursor = reader.clone();
	cursor.seek(data_start as usize);
	let Ok(count) = cursor.read_compressed_i32() else {
		return false;
	};
	if !(0..=0xFFFF).contains(&count) {
		return false;
	}

	for _ in 0..count {
		let Ok(tag) = cursor.read_u8() else {
			return false;
		};
		match tag {
			ENTRY_RESERVED => {
				cursor.skip(10);
				continue;
			}
			ENTRY_REFERENCE => {
				if cursor.read_u32().is_err() {
					return false;
				}
			}
			ENTRY_DIRECTORY | ENTRY_IMAGE => {
				if cursor.read_wz_string(&mut keystream.borrow_mut()).is_err() {
					return false;
				}
			}
			_ => return false,
		}
		let sizes_ok = cursor.read_compressed_i32().is_ok() && cursor.read_compressed_i32().is_ok();
		if !sizes_ok {
			return false;
		}
		match decode_offset(&mut cursor, data_start, hash) {
			Ok(offset) if (offset as usize) <= reader.len() => {}
			_ => return false,
		}
	}
	true
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_version_hash_folding() {
		assert_eq!(version_hash(1), u32::from(b'1') + 1);
		let h95 = version_hash(95);
		assert_eq!(h95, (u32::from(b'9') + 1) * 32 + u32::from(b'5') + 1);
	}

	#[test]
	fn test_version_key_is_byte_fold() {
		let hash = version_hash(95);
		let [b0, b1, b2, b3] = hash.to_le_bytes();
		assert_eq!(version_key(hash), u16::from(0xFF ^ b0 ^ b1 ^ b2 ^ b3));
	}

	#[test]
	fn test_offset_cipher_roundtrip() {
		let data_start = 0x3C;
		let hash = version_hash(95);
		for (entry_pos, target) in [(0x40u32, 0x1234u32), (0x100, 0xFFFF), (0x7F, 0x3D)] {
			let raw = encode_offset(entry_pos, data_start, hash, target);
			let mut buf = vec![0u8; entry_pos as usize];
			buf.extend_from_slice(&raw.to_le_bytes());
			let mut reader = Reader::from_vec(buf);
			reader.seek(entry_pos as usize);
			assert_eq!(decode_offset(&mut reader, data_start, hash).unwrap(), target);
		}
	}

	#[test]
	fn test_bad_magic_fails() {
		let err = FileSource::open_bytes(
			b"NOPE\0\0\0\0\0\0\0\0\0\0\0\0".to_vec(),
			"X",
			SourceOptions::default(),
		)
		.unwrap_err();
		assert!(matches!(err, WzError::MalformedArchive(_)));
	}

	#[test]
	fn test_truncated_header_fails() {
		assert!(FileSource::open_bytes(b"PKG1".to_vec(), "X", SourceOptions::default()).is_err());
	}
}
