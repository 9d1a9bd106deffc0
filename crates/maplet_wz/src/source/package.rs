//! Directory-shard packages.
//!
//! Later distributions split each archive into a directory of shard
//! files next to a tiny `.ini` index:
//!
//! ```text
//! Character/
//!   Character.ini          LastWzIndex|2
//!   Character_000.wz
//!   Character_001.wz
//!   Character_002.wz
//!   Afterimage/
//!     Afterimage.ini       (nested package)
//!     Afterimage.wz
//! ```
//!
//! `LastWzIndex|N` with a non-negative `N` names shards `_000` through
//! `_NNN` (three-digit zero padding, with an unpadded fallback); the
//! sentinel `-1` means the package is the single `<base>.wz`. Each shard
//! is an ordinary legacy archive; their roots are merged into one
//! combined root by reparenting the shard roots' children. A missing
//! shard is skipped with a warning, not a failure.
//!
//! Subdirectories that carry their own `.ini` are opened recursively as
//! nested packages and appear as directories under the package root.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::warn;

use crate::error::WzError;
use crate::node::Node;

use super::file::{FileSource, Layout};
use super::{PathResolver, SourceInfo, SourceOptions, split_link_path};

/// Key of the single meaningful line in a package index.
const INDEX_KEY: &str = "LastWzIndex";

struct PackageInner {
	name: String,
	dir: PathBuf,
	root: Node,
	shards: Vec<FileSource>,
	nested: Vec<PackageSource>,
	resolver: RefCell<Weak<dyn PathResolver>>,
}

/// A directory-shard package source.
///
/// Cheap to clone; clones share the merged tree and the shard list.
#[derive(Clone)]
pub struct PackageSource {
	inner: Rc<PackageInner>,
}

impl PackageSource {
	/// Opens the package rooted at directory `dir`.
	///
	/// Fails if the directory has no readable `.ini` index or if no shard
	/// could be opened at all; individual missing shards only warn.
	pub fn open(dir: impl AsRef<Path>, name: &str, options: SourceOptions) -> Result<Self, WzError> {
		let dir = dir.as_ref();
		let (base, last_index) = read_index(dir)?;

		let root = Node::directory(name);
		let mut shards = Vec::new();

		if last_index < 0 {
			let path = dir.join(format!("{base}.wz"));
			match FileSource::open(&path, name, options) {
				Ok(shard) => shards.push(shard),
				Err(err) => return Err(err),
			}
		} else {
			for index in 0..=last_index {
				let padded = dir.join(format!("{base}_{index:03}.wz"));
				let fallback = dir.join(format!("{base}_{index}.wz"));
				let path = if padded.is_file() {
					padded
				} else if fallback.is_file() {
					fallback
				} else {
					warn!(
						"{}",
						WzError::MissingShard {
							path: padded.display().to_string(),
						}
					);
					continue;
				};
				match FileSource::open(&path, name, options) {
					Ok(shard) => shards.push(shard),
					Err(err) => {
						warn!("shard '{}' unreadable: {err}", path.display());
					}
				}
			}
		}

		if shards.is_empty() {
			return Err(WzError::MalformedArchive(format!(
				"package '{}' has no readable shard",
				dir.display()
			)));
		}

		// Shallow merge: reparent each shard root's children under the
		// combined root. Nodes are shared, never copied.
		for shard in &shards {
			for child in shard.root().children() {
				root.append_child(child);
			}
		}

		// Subdirectories with their own index become nested packages.
		let mut nested = Vec::new();
		let mut subdirs: Vec<PathBuf> = fs::read_dir(dir)?
			.filter_map(Result::ok)
			.map(|entry| entry.path())
			.filter(|p| p.is_dir())
			.collect();
		subdirs.sort();
		for subdir in subdirs {
			if !has_index(&subdir) {
				continue;
			}
			let sub_name = subdir
				.file_name()
				.map(|n| n.to_string_lossy().into_owned())
				.unwrap_or_default();
			match PackageSource::open(&subdir, &sub_name, options) {
				Ok(package) => {
					root.append_child(package.root());
					nested.push(package);
				}
				Err(err) => {
					warn!("nested package '{}' unreadable: {err}", subdir.display());
				}
			}
		}

		let inner = Rc::new(PackageInner {
			name: name.to_owned(),
			dir: dir.to_path_buf(),
			root,
			shards,
			nested,
			resolver: RefCell::new(Weak::<PackageInner>::new()),
		});

		// Shards and nested packages route unresolved absolute links
		// through the combined tree.
		let upward_rc: Rc<dyn PathResolver> = inner.clone();
		let upward: Weak<dyn PathResolver> = Rc::downgrade(&upward_rc);
		for shard in &inner.shards {
			shard.set_resolver(upward.clone());
		}
		for nested in &inner.nested {
			nested.set_resolver(upward.clone());
		}

		Ok(Self {
			inner,
		})
	}

	/// Package name (also the merged root node name).
	#[inline]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Merged root directory node.
	#[inline]
	pub fn root(&self) -> Node {
		self.inner.root.clone()
	}

	/// Directory the package was opened from.
	#[inline]
	pub fn dir(&self) -> &Path {
		&self.inner.dir
	}

	/// Version of the first shard.
	pub fn version(&self) -> u16 {
		self.inner.shards.first().map_or(0, FileSource::version)
	}

	/// The opened shard sources, in index order.
	pub fn shards(&self) -> &[FileSource] {
		&self.inner.shards
	}

	/// Nested sub-packages, in directory order.
	pub fn nested(&self) -> &[PackageSource] {
		&self.inner.nested
	}

	/// Summary for diagnostics.
	pub fn info(&self) -> SourceInfo {
		SourceInfo {
			name: self.inner.name.clone(),
			layout: Layout::Package,
			version: self.version(),
			shards: self.inner.shards.len(),
		}
	}

	/// Wires the upward link resolver (usually the resource manager).
	pub fn set_resolver(&self, resolver: Weak<dyn PathResolver>) {
		*self.inner.resolver.borrow_mut() = resolver;
	}
}

impl std::fmt::Debug for PackageSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"PackageSource('{}', {} shard(s), {} nested)",
			self.inner.name,
			self.inner.shards.len(),
			self.inner.nested.len()
		)
	}
}

impl PathResolver for PackageInner {
	fn resolve_path(&self, path: &str) -> Option<Node> {
		let (archive, rest) = split_link_path(path);
		if archive == self.name
			&& let Some(node) = self.root.descend(rest)
		{
			return Some(node);
		}
		self.resolver.borrow().upgrade()?.resolve_path(path)
	}
}

/// Locates the `.ini` index in `dir` and parses `LastWzIndex|N`.
///
/// Returns the shard basename (the index file's stem) and `N`.
fn read_index(dir: &Path) -> Result<(String, i32), WzError> {
	let Some(index_path) = find_index(dir) else {
		return Err(WzError::MalformedArchive(format!(
			"no .ini index in '{}'",
			dir.display()
		)));
	};
	let base = index_path
		.file_stem()
		.map(|stem| stem.to_string_lossy().into_owned())
		.unwrap_or_default();

	let content = fs::read_to_string(&index_path)?;
	for line in content.lines() {
		let line = line.trim_start_matches('\u{FEFF}').trim();
		if let Some(value) = line.strip_prefix(INDEX_KEY).and_then(|r| r.strip_prefix('|')) {
			let last = value.trim().parse::<i32>().map_err(|_| {
				WzError::MalformedArchive(format!("bad {INDEX_KEY} value '{value}'"))
			})?;
			return Ok((base, last));
		}
	}
	Err(WzError::MalformedArchive(format!(
		"index '{}' has no {INDEX_KEY} line",
		index_path.display()
	)))
}

fn find_index(dir: &Path) -> Option<PathBuf> {
	let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
		.ok()?
		.filter_map(Result::ok)
		.map(|entry| entry.path())
		.filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("ini")))
		.collect();
	candidates.sort();
	candidates.into_iter().next()
}

fn has_index(dir: &Path) -> bool {
	find_index(dir).is_some()
}
