//! The archive node tree and property model.
//!
//! Every position in an archive is a [`Node`]: a named, reference-counted
//! tree cell holding a tagged [`Value`]. Parents own their children;
//! parent back-references are weak, so tearing down a subtree is
//! deterministic and link-following can never create a cycle.
//!
//! Two kinds of container behave differently:
//!
//! - a `Directory` is fully materialized when its archive is opened;
//! - an `Image` is a lazy container. The directory parser records a load
//!   hook (owning source + file offset); the first access to its children
//!   invokes the hook exactly once, after which the subtree is immutable.
//!
//! Queries never fail loudly. A missing child is `None`, a type mismatch
//! returns the caller's default, and a broken symbolic link resolves to
//! `None`. See the crate error policy in [`crate::error`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::warn;

use crate::canvas::Canvas;
use crate::reader::Reader;
use crate::sound::Sound;

/// Maximum depth of chained symbolic links before resolution gives up.
const MAX_LINK_DEPTH: u32 = 8;

/// An opaque byte range with a type tag (`RawData`, `Video`).
#[derive(Clone)]
pub struct Blob {
	inner: Rc<BlobInner>,
}

struct BlobInner {
	type_tag: String,
	data_offset: usize,
	data_len: usize,
	reader: Reader,
}

impl Blob {
	/// Describes an opaque payload inside an archive.
	pub fn new(type_tag: impl Into<String>, data_offset: usize, data_len: usize, reader: Reader) -> Self {
		Self {
			inner: Rc::new(BlobInner {
				type_tag: type_tag.into(),
				data_offset,
				data_len,
				reader,
			}),
		}
	}

	/// The extended-block type name this payload was stored under.
	#[inline]
	pub fn type_tag(&self) -> &str {
		&self.inner.type_tag
	}

	/// Payload length in bytes.
	#[inline]
	pub fn len(&self) -> usize {
		self.inner.data_len
	}

	/// Returns true if the payload is empty.
	#[inline]
	pub fn is_empty(&self) -> bool {
		self.inner.data_len == 0
	}

	/// Copies the payload bytes out of the archive.
	pub fn bytes(&self) -> Vec<u8> {
		let mut cursor = self.inner.reader.clone();
		cursor.seek(self.inner.data_offset);
		cursor.read_bytes(self.inner.data_len).unwrap_or_default()
	}
}

impl std::fmt::Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "Blob({}, {} bytes)", self.inner.type_tag, self.inner.data_len)
	}
}

/// The tagged payload of a [`Node`].
#[derive(Debug, Clone, Default)]
pub enum Value {
	/// No payload
	#[default]
	Null,
	/// Archive directory; children are directories and images only
	Directory,
	/// Lazy-loadable property container
	Image,
	/// Eager property container
	SubProperty,
	/// 16-bit integer
	Int16(i16),
	/// 32-bit integer
	Int(i32),
	/// 64-bit integer
	Long(i64),
	/// 32-bit float
	Float(f32),
	/// 64-bit float
	Double(f64),
	/// String
	String(String),
	/// 2D point
	Vector(i32, i32),
	/// Ordered convex polygon
	Convex(Vec<(i32, i32)>),
	/// Pixel surface
	Canvas(Canvas),
	/// Audio payload
	Sound(Sound),
	/// Opaque bytes with a type tag
	Raw(Blob),
	/// Opaque video bytes
	Video(Blob),
	/// Symbolic link to another node, by relative path
	Uol(String),
}

impl Value {
	/// Short lowercase tag for diagnostics and tree listings.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Directory => "directory",
			Self::Image => "image",
			Self::SubProperty => "property",
			Self::Int16(_) => "int16",
			Self::Int(_) => "int",
			Self::Long(_) => "long",
			Self::Float(_) => "float",
			Self::Double(_) => "double",
			Self::String(_) => "string",
			Self::Vector(..) => "vector",
			Self::Convex(_) => "convex",
			Self::Canvas(_) => "canvas",
			Self::Sound(_) => "sound",
			Self::Raw(_) => "raw",
			Self::Video(_) => "video",
			Self::Uol(_) => "uol",
		}
	}
}

/// Callback surface a lazy image node uses to reach its owning source.
pub trait ImageLoader {
	/// Populates `node` from the payload recorded at `offset`.
	///
	/// Invoked at most once per node. Implementations log parse faults
	/// and leave the node empty; they must not recurse into `node`'s
	/// children during the load.
	fn load_image(&self, node: &Node, offset: usize, size: usize);

	/// Resolves an absolute cross-archive path (`Archive/a/b.img/c`).
	fn resolve_outlink(&self, path: &str) -> Option<Node>;
}

/// Lazy-load hook recorded on an image node at directory-parse time.
pub struct LoadHook {
	loader: Weak<dyn ImageLoader>,
	offset: usize,
	size: usize,
	loaded: Cell<bool>,
}

impl LoadHook {
	/// Creates a hook for the image payload at `offset`.
	pub fn new(loader: Weak<dyn ImageLoader>, offset: usize, size: usize) -> Self {
		Self {
			loader,
			offset,
			size,
			loaded: Cell::new(false),
		}
	}
}

struct NodeInner {
	name: String,
	parent: RefCell<Weak<NodeInner>>,
	children: RefCell<Vec<Node>>,
	index: RefCell<HashMap<String, usize>>,
	value: RefCell<Value>,
	hook: RefCell<Option<LoadHook>>,
	link: RefCell<Option<Option<Node>>>,
}

/// A named position in the archive tree.
///
/// `Node` is a cheap handle; clones share the same tree cell. Equality is
/// identity: two handles compare equal when they point at the same cell.
#[derive(Clone)]
pub struct Node {
	inner: Rc<NodeInner>,
}

impl Node {
	/// Creates a detached node.
	pub fn new(name: impl Into<String>, value: Value) -> Self {
		Self {
			inner: Rc::new(NodeInner {
				name: name.into(),
				parent: RefCell::new(Weak::new()),
				children: RefCell::new(Vec::new()),
				index: RefCell::new(HashMap::new()),
				value: RefCell::new(value),
				hook: RefCell::new(None),
				link: RefCell::new(None),
			}),
		}
	}

	/// Creates a directory node.
	pub fn directory(name: impl Into<String>) -> Self {
		Self::new(name, Value::Directory)
	}

	/// Creates an eager property container node.
	pub fn sub_property(name: impl Into<String>) -> Self {
		Self::new(name, Value::SubProperty)
	}

	/// Creates an image container node (loads lazily once a hook is set).
	pub fn image(name: impl Into<String>) -> Self {
		Self::new(name, Value::Image)
	}

	/// Node name, unique among siblings.
	#[inline]
	pub fn name(&self) -> &str {
		&self.inner.name
	}

	/// Parent node, if attached.
	pub fn parent(&self) -> Option<Node> {
		self.inner.parent.borrow().upgrade().map(|inner| Node {
			inner,
		})
	}

	/// A copy of the current value tag.
	pub fn value(&self) -> Value {
		self.inner.value.borrow().clone()
	}

	/// Replaces the node's value.
	pub(crate) fn set_value(&self, value: Value) {
		*self.inner.value.borrow_mut() = value;
	}

	/// Registers the lazy-load hook for an image node.
	pub fn set_load_hook(&self, hook: LoadHook) {
		*self.inner.hook.borrow_mut() = Some(hook);
	}

	/// Short lowercase tag of the current value.
	pub fn kind(&self) -> &'static str {
		self.inner.value.borrow().kind()
	}

	/// True for directory nodes.
	pub fn is_directory(&self) -> bool {
		matches!(&*self.inner.value.borrow(), Value::Directory)
	}

	/// True for image container nodes.
	pub fn is_image(&self) -> bool {
		matches!(&*self.inner.value.borrow(), Value::Image)
	}

	/// True for symbolic link nodes.
	pub fn is_uol(&self) -> bool {
		matches!(&*self.inner.value.borrow(), Value::Uol(_))
	}

	/// Attaches `child` as the last child of `self`.
	///
	/// Sibling names are unique; a duplicate is dropped with a warning.
	pub fn append_child(&self, child: Node) {
		let mut index = self.inner.index.borrow_mut();
		if index.contains_key(child.name()) {
			warn!("duplicate child '{}' under '{}' dropped", child.name(), self.name());
			return;
		}
		*child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
		let mut children = self.inner.children.borrow_mut();
		index.insert(child.name().to_owned(), children.len());
		children.push(child);
	}

	/// Triggers the lazy image load if it has not happened yet.
	fn ensure_loaded(&self) {
		let pending = {
			let hook = self.inner.hook.borrow();
			match hook.as_ref() {
				Some(hook) if !hook.loaded.get() => {
					hook.loaded.set(true);
					Some((hook.loader.clone(), hook.offset, hook.size))
				}
				_ => None,
			}
		};
		if let Some((loader, offset, size)) = pending {
			if let Some(loader) = loader.upgrade() {
				loader.load_image(self, offset, size);
			} else {
				warn!("image '{}' has no live source to load from", self.name());
			}
		}
	}

	/// Direct named child lookup. Triggers a lazy image load.
	pub fn child(&self, name: &str) -> Option<Node> {
		self.ensure_loaded();
		let index = self.inner.index.borrow();
		let pos = *index.get(name)?;
		Some(self.inner.children.borrow()[pos].clone())
	}

	/// True if a direct child with `name` exists.
	pub fn has_child(&self, name: &str) -> bool {
		self.child(name).is_some()
	}

	/// All children in insertion/load order. Triggers a lazy image load.
	///
	/// The order is the on-disk order of the archive and is stable across
	/// calls and across process runs.
	pub fn children(&self) -> Vec<Node> {
		self.ensure_loaded();
		self.inner.children.borrow().clone()
	}

	/// Number of children. Triggers a lazy image load.
	pub fn child_count(&self) -> usize {
		self.ensure_loaded();
		self.inner.children.borrow().len()
	}

	/// Walks a `/`-separated path from this node.
	///
	/// `..` ascends; empty segments are skipped. Symbolic links along the
	/// way are followed transparently.
	pub fn descend(&self, path: &str) -> Option<Node> {
		self.descend_bounded(path, 0)
	}

	fn descend_bounded(&self, path: &str, depth: u32) -> Option<Node> {
		let mut current = self.clone();
		for segment in path.split('/') {
			if segment.is_empty() || segment == "." {
				continue;
			}
			if segment == ".." {
				current = current.parent()?;
				continue;
			}
			let mut next = current.child(segment)?;
			if next.is_uol() {
				next = next.resolve_uol(depth + 1)?;
			}
			current = next;
		}
		Some(current)
	}

	/// Follows a `UOL` payload relative to the parent node.
	fn resolve_uol(&self, depth: u32) -> Option<Node> {
		if depth > MAX_LINK_DEPTH {
			warn!("symbolic link chain too deep at '{}'", self.path());
			return None;
		}
		let target = match &*self.inner.value.borrow() {
			Value::Uol(path) => path.clone(),
			_ => return Some(self.clone()),
		};
		self.parent()?.descend_bounded(&target, depth)
	}

	/// Nearest ancestor (including self) that is an image container.
	pub fn nearest_image(&self) -> Option<Node> {
		let mut current = self.clone();
		loop {
			if current.is_image() {
				return Some(current);
			}
			current = current.parent()?;
		}
	}

	/// Nearest ancestor (including self) that carries a load hook, i.e.
	/// knows its owning source.
	fn nearest_hooked(&self) -> Option<(Node, Weak<dyn ImageLoader>)> {
		let mut current = self.clone();
		loop {
			let loader = current
				.inner
				.hook
				.borrow()
				.as_ref()
				.map(|hook| hook.loader.clone());
			if let Some(loader) = loader {
				return Some((current, loader));
			}
			current = current.parent()?;
		}
	}

	/// Full slash-joined path from the tree root.
	pub fn path(&self) -> String {
		let mut segments = vec![self.name().to_owned()];
		let mut current = self.parent();
		while let Some(node) = current {
			if !node.name().is_empty() {
				segments.push(node.name().to_owned());
			}
			current = node.parent();
		}
		segments.reverse();
		segments.join("/")
	}

	// ---- typed accessors -------------------------------------------------

	/// Integer view of the value; scalar family cross-converts, strings
	/// parse. Anything else yields `default`.
	pub fn as_int(&self, default: i32) -> i32 {
		match &*self.inner.value.borrow() {
			Value::Int16(v) => i32::from(*v),
			Value::Int(v) => *v,
			Value::Long(v) => *v as i32,
			Value::Float(v) => *v as i32,
			Value::Double(v) => *v as i32,
			Value::String(s) => s.trim().parse().unwrap_or(default),
			_ => default,
		}
	}

	/// 64-bit integer view of the value.
	pub fn as_long(&self, default: i64) -> i64 {
		match &*self.inner.value.borrow() {
			Value::Int16(v) => i64::from(*v),
			Value::Int(v) => i64::from(*v),
			Value::Long(v) => *v,
			Value::Float(v) => *v as i64,
			Value::Double(v) => *v as i64,
			Value::String(s) => s.trim().parse().unwrap_or(default),
			_ => default,
		}
	}

	/// 32-bit float view of the value.
	pub fn as_float(&self, default: f32) -> f32 {
		match &*self.inner.value.borrow() {
			Value::Int16(v) => f32::from(*v),
			Value::Int(v) => *v as f32,
			Value::Long(v) => *v as f32,
			Value::Float(v) => *v,
			Value::Double(v) => *v as f32,
			Value::String(s) => s.trim().parse().unwrap_or(default),
			_ => default,
		}
	}

	/// 64-bit float view of the value.
	pub fn as_double(&self, default: f64) -> f64 {
		match &*self.inner.value.borrow() {
			Value::Int16(v) => f64::from(*v),
			Value::Int(v) => f64::from(*v),
			Value::Long(v) => *v as f64,
			Value::Float(v) => f64::from(*v),
			Value::Double(v) => *v,
			Value::String(s) => s.trim().parse().unwrap_or(default),
			_ => default,
		}
	}

	/// String view of the value; scalars render themselves.
	pub fn as_string(&self, default: &str) -> String {
		match &*self.inner.value.borrow() {
			Value::String(s) => s.clone(),
			Value::Uol(s) => s.clone(),
			Value::Int16(v) => v.to_string(),
			Value::Int(v) => v.to_string(),
			Value::Long(v) => v.to_string(),
			Value::Float(v) => v.to_string(),
			Value::Double(v) => v.to_string(),
			_ => default.to_owned(),
		}
	}

	/// 2D point view of the value.
	pub fn as_vector(&self) -> Option<(i32, i32)> {
		match &*self.inner.value.borrow() {
			Value::Vector(x, y) => Some((*x, *y)),
			_ => None,
		}
	}

	/// Convex polygon view of the value.
	pub fn as_convex(&self) -> Option<Vec<(i32, i32)>> {
		match &*self.inner.value.borrow() {
			Value::Convex(points) => Some(points.clone()),
			_ => None,
		}
	}

	/// Sound view of the value.
	pub fn as_sound(&self) -> Option<Sound> {
		match &*self.inner.value.borrow() {
			Value::Sound(sound) => Some(sound.clone()),
			_ => None,
		}
	}

	/// Canvas view of the value, following symbolic links.
	///
	/// Resolution order: a `UOL` payload first, then an `_outlink` child
	/// (absolute path, resolved by the owning source), then an `_inlink`
	/// child (relative to the nearest image ancestor). The resolved node
	/// is cached, so repeated access costs one lookup.
	pub fn as_canvas(&self) -> Option<Canvas> {
		let target = self.resolve_linked(0)?;
		match &*target.inner.value.borrow() {
			Value::Canvas(canvas) => Some(canvas.clone()),
			_ => None,
		}
	}

	/// Resolves this node through any symbolic indirection, with caching.
	pub fn resolve_linked(&self, depth: u32) -> Option<Node> {
		if depth > MAX_LINK_DEPTH {
			warn!("link chain too deep at '{}'", self.path());
			return None;
		}
		if let Some(cached) = self.inner.link.borrow().as_ref() {
			return cached.clone();
		}

		let resolved = self.resolve_linked_uncached(depth);
		*self.inner.link.borrow_mut() = Some(resolved.clone());
		resolved
	}

	fn resolve_linked_uncached(&self, depth: u32) -> Option<Node> {
		if self.is_uol() {
			let target = self.resolve_uol(depth + 1)?;
			return target.resolve_linked(depth + 1);
		}

		if let Some(outlink) = self.child("_outlink") {
			let path = outlink.as_string("");
			if !path.is_empty() {
				let (_, loader) = self.nearest_hooked()?;
				let target = loader.upgrade()?.resolve_outlink(&path)?;
				return if target == *self {
					Some(target)
				} else {
					target.resolve_linked(depth + 1)
				};
			}
		}

		if let Some(inlink) = self.child("_inlink") {
			let path = inlink.as_string("");
			if !path.is_empty() {
				let image = self.nearest_image()?;
				let target = image.descend_bounded(&path, depth + 1)?;
				return if target == *self {
					Some(target)
				} else {
					target.resolve_linked(depth + 1)
				};
			}
		}

		Some(self.clone())
	}
}

impl PartialEq for Node {
	fn eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for Node {}

impl std::fmt::Debug for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(
			f,
			"Node('{}', {}, {} children)",
			self.name(),
			self.kind(),
			self.inner.children.borrow().len()
		)
	}
}

impl std::fmt::Display for Node {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{} ({})", self.path(), self.kind())
	}
}
