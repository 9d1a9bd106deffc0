//! Layer ordering tables.
//!
//! Two process-wide tables are loaded once at startup from the base
//! archive:
//!
//! - the **z-map** (`zmap.img`) assigns every visual-slot name a z-index.
//!   Entries are listed back-to-front; an entry without an explicit
//!   integer value receives the next value of a decrementing counter, and
//!   an entry *with* an integer resets the counter to it. Deterministic
//!   child order makes the assignment reproducible.
//! - the **slot-map** (`smap.img`) aliases visual-slot names, so that
//!   variant spellings in item data resolve to canonical z-map keys.

use std::collections::HashMap;

use log::warn;
use maplet_wz::Node;

/// Visual-slot name → z-index table.
#[derive(Debug, Clone, Default)]
pub struct ZMap {
	indices: HashMap<String, i32>,
	order: Vec<String>,
}

impl ZMap {
	/// Builds the table from the `zmap.img` node.
	///
	/// Children are consumed in on-disk order. An integer-valued child
	/// resets the running counter; a valueless child takes the next
	/// decrement.
	pub fn load(zmap: &Node) -> Self {
		let mut indices = HashMap::new();
		let mut order = Vec::new();
		let mut counter = 0i32;
		for child in zmap.children() {
			let explicit = child.as_int(i32::MIN);
			let z = if explicit == i32::MIN {
				counter -= 1;
				counter
			} else {
				counter = explicit;
				explicit
			};
			if indices.insert(child.name().to_owned(), z).is_some() {
				warn!("duplicate z-map entry '{}'", child.name());
			}
			order.push(child.name().to_owned());
		}
		Self {
			indices,
			order,
		}
	}

	/// Z-index of a visual-slot name, `0` if unknown.
	pub fn z_of(&self, slot: &str) -> i32 {
		self.indices.get(slot).copied().unwrap_or(0)
	}

	/// True if the slot name has an assigned z-index.
	pub fn contains(&self, slot: &str) -> bool {
		self.indices.contains_key(slot)
	}

	/// Number of entries.
	pub fn len(&self) -> usize {
		self.indices.len()
	}

	/// True if the table is empty.
	pub fn is_empty(&self) -> bool {
		self.indices.is_empty()
	}

	/// Slot names in load order (back to front).
	pub fn names(&self) -> &[String] {
		&self.order
	}
}

/// Visual-slot alias table.
#[derive(Debug, Clone, Default)]
pub struct SlotMap {
	aliases: HashMap<String, String>,
}

impl SlotMap {
	/// Builds the table from the `smap.img` node; each child maps its
	/// name to its string value.
	pub fn load(smap: &Node) -> Self {
		let mut aliases = HashMap::new();
		for child in smap.children() {
			let target = child.as_string("");
			if target.is_empty() {
				continue;
			}
			aliases.insert(child.name().to_owned(), target);
		}
		Self {
			aliases,
		}
	}

	/// Canonical name for `slot`, or `slot` itself if unaliased.
	pub fn canonical<'a>(&'a self, slot: &'a str) -> &'a str {
		self.aliases.get(slot).map_or(slot, String::as_str)
	}

	/// Number of aliases.
	pub fn len(&self) -> usize {
		self.aliases.len()
	}

	/// True if no aliases are loaded.
	pub fn is_empty(&self) -> bool {
		self.aliases.is_empty()
	}
}

/// Both layer-ordering tables, loaded together.
#[derive(Debug, Clone, Default)]
pub struct LayerOrder {
	/// Visual-slot z-indices
	pub zmap: ZMap,
	/// Visual-slot aliases
	pub smap: SlotMap,
}

impl LayerOrder {
	/// Loads `zmap.img` and `smap.img` through the resource manager.
	pub fn load(rm: &maplet_wz::ResourceManager) -> Self {
		Self {
			zmap: ZMap::load(&rm.get_property("Base/zmap.img")),
			smap: SlotMap::load(&rm.get_property("Base/smap.img")),
		}
	}

	/// Z-index for a (possibly aliased) visual-slot name.
	pub fn z_of(&self, slot: &str) -> i32 {
		if self.zmap.contains(slot) {
			self.zmap.z_of(slot)
		} else {
			self.zmap.z_of(self.smap.canonical(slot))
		}
	}
}
