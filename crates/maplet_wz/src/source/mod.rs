//! Archive sources.
//!
//! Two physical layouts hide behind one interface:
//!
//! - [`FileSource`]: the legacy single-file archive (`<name>.wz`), and its
//!   64-bit sibling that dropped the embedded version field;
//! - [`PackageSource`]: a directory holding an `.ini` shard index plus
//!   `<name>_000.wz`-style shard files, each of which is itself a legacy
//!   single-file archive. Shard roots are merged by reparenting into one
//!   combined tree, and subdirectories carrying their own `.ini` become
//!   nested packages.
//!
//! [`Source::open`] sniffs the path and picks the right variant.

pub mod file;
pub mod package;

pub use file::{FileSource, Layout, decode_offset, encode_offset, version_hash, version_key};
pub use package::PackageSource;

use std::path::Path;
use std::rc::Weak;

use serde::Serialize;

use crate::crypto::IV_ZERO;
use crate::error::WzError;
use crate::node::Node;

/// Options applied when opening a source.
#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
	/// Region initialization vector for the obfuscation keystream.
	pub iv: [u8; 4],
}

impl Default for SourceOptions {
	fn default() -> Self {
		Self {
			iv: IV_ZERO,
		}
	}
}

/// Upward delegation surface for absolute symbolic links.
///
/// A shard delegates paths it cannot serve to its package; a package
/// delegates to the resource manager; the manager routes by archive name.
pub trait PathResolver {
	/// Resolves an absolute path (`Archive/a/b.img/c`) to a node.
	fn resolve_path(&self, path: &str) -> Option<Node>;
}

/// Summary of an opened source, for diagnostics and tooling.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
	/// Archive name
	pub name: String,
	/// Physical layout
	pub layout: Layout,
	/// Decoded version number
	pub version: u16,
	/// Number of shard files (1 for single-file layouts)
	pub shards: usize,
}

/// An opened archive of either layout.
#[derive(Clone)]
pub enum Source {
	/// Legacy single-file archive
	File(FileSource),
	/// Directory-shard package
	Package(PackageSource),
}

impl Source {
	/// Opens the archive at `path`, sniffing the layout.
	///
	/// A directory is opened as a shard package; anything else as a
	/// single-file archive. `name` becomes the root node name and the
	/// prefix recognized by absolute link resolution.
	pub fn open(path: impl AsRef<Path>, name: &str, options: SourceOptions) -> Result<Self, WzError> {
		let path = path.as_ref();
		if path.is_dir() {
			Ok(Self::Package(PackageSource::open(path, name, options)?))
		} else {
			Ok(Self::File(FileSource::open(path, name, options)?))
		}
	}

	/// Archive name.
	pub fn name(&self) -> &str {
		match self {
			Self::File(source) => source.name(),
			Self::Package(source) => source.name(),
		}
	}

	/// Root directory node.
	pub fn root(&self) -> Node {
		match self {
			Self::File(source) => source.root(),
			Self::Package(source) => source.root(),
		}
	}

	/// Decoded version number (first shard's version for packages).
	pub fn version(&self) -> u16 {
		match self {
			Self::File(source) => source.version(),
			Self::Package(source) => source.version(),
		}
	}

	/// Summary for diagnostics.
	pub fn info(&self) -> SourceInfo {
		match self {
			Self::File(source) => source.info(),
			Self::Package(source) => source.info(),
		}
	}

	/// Wires the upward link resolver (package or resource manager).
	pub fn set_resolver(&self, resolver: Weak<dyn PathResolver>) {
		match self {
			Self::File(source) => source.set_resolver(resolver),
			Self::Package(source) => source.set_resolver(resolver),
		}
	}
}

impl std::fmt::Debug for Source {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let info = self.info();
		write!(
			f,
			"Source('{}', {:?}, v{}, {} shard(s))",
			info.name, info.layout, info.version, info.shards
		)
	}
}

/// Strips a trailing `.wz` from the first path segment and splits an
/// absolute link path into (archive, rest).
pub(crate) fn split_link_path(path: &str) -> (&str, &str) {
	let trimmed = path.trim_start_matches('/');
	let (head, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
	let head = head.strip_suffix(".wz").unwrap_or(head);
	(head, rest)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_split_link_path() {
		assert_eq!(split_link_path("Character/Cap/x.img"), ("Character", "Cap/x.img"));
		assert_eq!(split_link_path("Map001.wz/Back/b.img/0"), ("Map001", "Back/b.img/0"));
		assert_eq!(split_link_path("Solo"), ("Solo", ""));
	}
}
