//! The named-archive table and property query front.
//!
//! The original engine kept one process-global registry of open archives.
//! Here that registry is an explicit [`ResourceManager`] handle threaded
//! through the subsystems that need it; callers that want a singleton can
//! keep one themselves. The manager is deliberately not `Send`: all
//! archive access is confined to the game thread.
//!
//! [`ResourceManager::get_property`] is the workhorse: it takes a full
//! path (`"Character/Cap/01002357.img/info/icon"`), routes the first
//! segment to the right archive, caches the result, and never returns a
//! broken handle — a miss yields a shared empty property so callers only
//! null-check the children they actually read.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use log::{info, warn};

use crate::error::WzError;
use crate::node::Node;
use crate::source::{PathResolver, Source, SourceOptions, split_link_path};

/// Archives opened at initialization, in order. Names missing on disk are
/// skipped.
pub const LOAD_ORDER: &[&str] = &[
	"Character",
	"Item",
	"UI",
	"Map",
	"Mob",
	"Npc",
	"Skill",
	"Sound",
	"String",
	"Etc",
	"Morph",
	"Reactor",
	"TamingMob",
	"Effect",
];

/// Name of the bootstrap archive holding the version manifest.
const BASE_ARCHIVE: &str = "Base";

/// Name of the version-manifest image inside the base archive.
const VERSION_IMAGE: &str = "Version.img";

struct ManagerInner {
	base_dir: PathBuf,
	sources: RefCell<Vec<Source>>,
	by_name: RefCell<HashMap<String, usize>>,
	versions: HashMap<String, i32>,
	cache: RefCell<HashMap<String, Node>>,
	empty: Node,
}

/// Table of open archives plus the property query cache.
///
/// Cheap to clone; clones share the table and cache.
#[derive(Clone)]
pub struct ResourceManager {
	inner: Rc<ManagerInner>,
}

impl ResourceManager {
	/// Opens the base archive under `base_dir`, reads its version
	/// manifest and opens the remaining archives in [`LOAD_ORDER`].
	///
	/// Only a missing or unreadable base archive is fatal; any other
	/// archive missing on disk is skipped with a log line.
	pub fn initialize(base_dir: impl AsRef<Path>, options: SourceOptions) -> Result<Self, WzError> {
		let base_dir = base_dir.as_ref().to_path_buf();

		let base = open_named(&base_dir, BASE_ARCHIVE, options)?;
		let versions = read_version_manifest(&base);
		info!(
			"base archive v{} lists {} archive version(s)",
			base.version(),
			versions.len()
		);

		let inner = Rc::new(ManagerInner {
			base_dir: base_dir.clone(),
			sources: RefCell::new(Vec::new()),
			by_name: RefCell::new(HashMap::new()),
			versions,
			cache: RefCell::new(HashMap::new()),
			empty: Node::sub_property(""),
		});
		let manager = Self {
			inner,
		};

		manager.adopt(base);
		for name in LOAD_ORDER {
			match open_named(&base_dir, name, options) {
				Ok(source) => manager.adopt(source),
				Err(WzError::IOError(err)) if err.kind() == std::io::ErrorKind::NotFound => {
					info!("archive '{name}' not present, skipped");
				}
				Err(err) => {
					warn!("archive '{name}' failed to open: {err}");
				}
			}
		}
		Ok(manager)
	}

	/// Creates an empty manager and registers the given sources.
	///
	/// Bypasses the on-disk load order; used by tools and tests that
	/// assemble their archives by hand.
	pub fn from_sources(sources: impl IntoIterator<Item = Source>) -> Self {
		let manager = Self {
			inner: Rc::new(ManagerInner {
				base_dir: PathBuf::new(),
				sources: RefCell::new(Vec::new()),
				by_name: RefCell::new(HashMap::new()),
				versions: HashMap::new(),
				cache: RefCell::new(HashMap::new()),
				empty: Node::sub_property(""),
			}),
		};
		for source in sources {
			manager.adopt(source);
		}
		manager
	}

	fn adopt(&self, source: Source) {
		let inner: Rc<dyn PathResolver> = self.inner.clone();
		let resolver: Weak<dyn PathResolver> = Rc::downgrade(&inner);
		source.set_resolver(resolver);
		let mut by_name = self.inner.by_name.borrow_mut();
		let mut sources = self.inner.sources.borrow_mut();
		if by_name.contains_key(source.name()) {
			warn!("archive '{}' already registered, replacement dropped", source.name());
			return;
		}
		by_name.insert(source.name().to_owned(), sources.len());
		sources.push(source);
	}

	/// Directory the archives were opened from.
	pub fn base_dir(&self) -> &Path {
		&self.inner.base_dir
	}

	/// The open archive named `name`, if any.
	pub fn source(&self, name: &str) -> Option<Source> {
		let by_name = self.inner.by_name.borrow();
		let index = *by_name.get(name)?;
		Some(self.inner.sources.borrow()[index].clone())
	}

	/// Names of all open archives, in registration order.
	pub fn archive_names(&self) -> Vec<String> {
		self.inner
			.sources
			.borrow()
			.iter()
			.map(|source| source.name().to_owned())
			.collect()
	}

	/// Manifest version of an archive, `0` if unlisted.
	pub fn version_of(&self, name: &str) -> i32 {
		self.inner.versions.get(name).copied().unwrap_or(0)
	}

	/// Looks up a property by full path, caching the result.
	///
	/// The first path segment names the archive. The returned node is
	/// never a broken handle: on any miss the shared empty property is
	/// returned, so callers chain `child` lookups and null-check only the
	/// leaves they consume.
	pub fn get_property(&self, path: &str) -> Node {
		if let Some(cached) = self.inner.cache.borrow().get(path) {
			return cached.clone();
		}

		let resolved = self.inner.resolve_path(path);
		match resolved {
			Some(node) => {
				self.inner
					.cache
					.borrow_mut()
					.insert(path.to_owned(), node.clone());
				node
			}
			None => self.inner.empty.clone(),
		}
	}

	/// Drops every cached property handle.
	pub fn flush(&self) {
		self.inner.cache.borrow_mut().clear();
	}

	/// Reads the raw audio bytes referenced by a sound property.
	///
	/// Returns an empty buffer when the node is no sound.
	pub fn load_sound_data(&self, node: &Node) -> Vec<u8> {
		node.as_sound().map(|sound| sound.data()).unwrap_or_default()
	}
}

impl PathResolver for ManagerInner {
	fn resolve_path(&self, path: &str) -> Option<Node> {
		let (archive, rest) = split_link_path(path);
		let index = *self.by_name.borrow().get(archive)?;
		let root = self.sources.borrow()[index].root();
		if rest.is_empty() {
			Some(root)
		} else {
			root.descend(rest)
		}
	}
}

impl std::fmt::Debug for ResourceManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"ResourceManager({} archive(s), {} cached propert(ies))",
			self.inner.sources.borrow().len(),
			self.inner.cache.borrow().len()
		)
	}
}

/// Opens `<dir>/<name>` as a package directory or `<dir>/<name>.wz` as a
/// single file, whichever exists.
fn open_named(dir: &Path, name: &str, options: SourceOptions) -> Result<Source, WzError> {
	let as_dir = dir.join(name);
	if as_dir.is_dir() {
		return Source::open(as_dir, name, options);
	}
	let as_file = dir.join(format!("{name}.wz"));
	if as_file.is_file() {
		return Source::open(as_file, name, options);
	}
	Err(WzError::IOError(std::io::Error::new(
		std::io::ErrorKind::NotFound,
		format!("no archive '{name}' under '{}'", dir.display()),
	)))
}

/// Reads the archive-name → version manifest from the base archive.
fn read_version_manifest(base: &Source) -> HashMap<String, i32> {
	let mut versions = HashMap::new();
	let Some(manifest) = base.root().child(VERSION_IMAGE) else {
		warn!("base archive has no {VERSION_IMAGE}");
		return versions;
	};
	for entry in manifest.children() {
		versions.insert(entry.name().to_owned(), entry.as_int(0));
	}
	versions
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::node::Value;
	use crate::source::FileSource;

	/// A manager over an in-memory archive, no disk involved.
	fn stub_manager() -> ResourceManager {
		let data = crate::test_archive::minimal_archive();
		let source = FileSource::open_bytes(data, "UI", SourceOptions::default()).unwrap();
		ResourceManager::from_sources([Source::File(source)])
	}

	#[test]
	fn test_get_property_miss_is_empty_not_broken() {
		let manager = stub_manager();
		let node = manager.get_property("UI/DoesNot/exist.img");
		assert_eq!(node.child_count(), 0);
		assert!(node.child("whatever").is_none());

		let unknown_archive = manager.get_property("Ghost/thing.img");
		assert_eq!(unknown_archive.child_count(), 0);
	}

	#[test]
	fn test_get_property_caches() {
		let manager = stub_manager();
		let first = manager.get_property("UI");
		let second = manager.get_property("UI");
		assert_eq!(first, second);

		manager.flush();
		let third = manager.get_property("UI");
		assert_eq!(first, third);
	}

	#[test]
	fn test_version_of_unlisted_is_zero() {
		let manager = stub_manager();
		assert_eq!(manager.version_of("UI"), 0);
	}

	#[test]
	fn test_load_sound_data_on_non_sound() {
		let manager = stub_manager();
		let node = Node::new("x", Value::Int(3));
		assert!(manager.load_sound_data(&node).is_empty());
	}
}
