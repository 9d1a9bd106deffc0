//! Equipped-item metadata.
//!
//! Every equipment id maps to an image in the `Character` archive; the
//! directory is derived from the id's category prefix (`id / 10_000`):
//!
//! | Prefix | Directory | Prefix | Directory |
//! |--------|-----------|--------|-----------|
//! | 0, 1   | (archive root: body, head) | 106 | `Pants` |
//! | 2      | `Face`    | 107 | `Shoes` |
//! | 3, 4   | `Hair`    | 108 | `Glove` |
//! | 100    | `Cap`     | 109 | `Shield` |
//! | 101–103, 111–114 | `Accessory` | 110 | `Cape` |
//! | 104    | `Coat`    | 180, 181 | `PetEquip` |
//! | 105    | `Longcoat`| 190 | `TamingMob` |
//! | 121–170 | `Weapon` | | |
//!
//! Weapons additionally carry a weapon class, `(id / 10_000) % 100`,
//! validated against the 30-entry weapon-type table (classes 30–59).
//! Prefix 170 is the weapon-sticker category: cosmetic skins applied on
//! top of a real weapon.
//!
//! Loaded entries cache the item's image root and the `info` fields the
//! compositors consult; lookups are cached by id, including misses.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use maplet_wz::{Node, ResourceManager};

/// Number of recognized weapon classes.
pub const WEAPON_CLASS_COUNT: usize = 30;

/// Valid weapon classes, `(id / 10_000) % 100` for weapon categories.
pub const WEAPON_CLASSES: [i32; WEAPON_CLASS_COUNT] = [
	30, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, 49, 50, 51, 52,
	53, 54, 55, 56, 57, 58, 59,
];

/// Category prefix of weapon stickers.
const STICKER_PREFIX: i32 = 170;

/// Derives the archive path of an item's image from its id.
///
/// Returns `None` for ids in no renderable category.
pub fn item_image_path(id: i32) -> Option<String> {
	if id < 0 {
		return None;
	}
	let prefix = id / 10_000;
	let dir = match prefix {
		0 | 1 => return Some(format!("Character/{id:08}.img")),
		2 => "Face",
		3 | 4 => "Hair",
		100 => "Cap",
		101..=103 | 111..=114 => "Accessory",
		104 => "Coat",
		105 => "Longcoat",
		106 => "Pants",
		107 => "Shoes",
		108 => "Glove",
		109 => "Shield",
		110 => "Cape",
		180 | 181 => "PetEquip",
		190 => "TamingMob",
		121..=170 => "Weapon",
		_ => return None,
	};
	Some(format!("Character/{dir}/{id:08}.img"))
}

/// Weapon class of an item id, `0` when the id is no weapon or its class
/// is not in the weapon-type table.
pub fn weapon_class(id: i32) -> i32 {
	let prefix = id / 10_000;
	if !(121..=170).contains(&prefix) {
		return 0;
	}
	let class = prefix % 100;
	if WEAPON_CLASSES.contains(&class) {
		class
	} else {
		0
	}
}

/// True for ids in the weapon-sticker category.
pub fn is_weapon_sticker(id: i32) -> bool {
	id / 10_000 == STICKER_PREFIX
}

/// Cached per-item metadata.
#[derive(Debug, Clone)]
pub struct ItemEntry {
	/// Equipment id
	pub id: i32,
	/// Item image root node
	pub root: Node,
	/// Wearability slot name (`info/islot`)
	pub item_slot: String,
	/// Rendering slot name (`info/vslot`)
	pub visual_slot: String,
	/// Weapon class, `0` for non-weapons
	pub weapon_class: i32,
	/// After-image (swing trail) reference
	pub after_image: String,
	/// Attack-speed stat
	pub attack_speed: i32,
	/// Walk-animation override
	pub walk: i32,
	/// Stand-animation override
	pub stand: i32,
	/// Attack-animation override
	pub attack: i32,
	/// Sound-effect reference
	pub sfx: String,
	/// Weekly-rotation flag
	pub weekly: bool,
	/// Alternate image used while the weekly rotation is active
	pub weekly_root: Option<Node>,
	/// Item hides the face while worn
	pub invisible_face: bool,
	/// Frames extend past the body frame count
	pub extend_frame: bool,
	/// Default frame for vehicles
	pub vehicle_default_frame: Option<String>,
}

impl ItemEntry {
	/// Builds an entry from an item image root, reading the `info`
	/// fields the compositors consult.
	pub fn from_root(id: i32, root: Node) -> Self {
		let info = root.child("info").unwrap_or_else(|| Node::sub_property("info"));
		let string_field = |name: &str| info.child(name).map_or(String::new(), |n| n.as_string(""));
		let int_field = |name: &str| info.child(name).map_or(0, |n| n.as_int(0));
		let flag = |name: &str| info.child(name).is_some_and(|n| n.as_int(0) != 0);

		let weekly = flag("weekly");
		Self {
			id,
			item_slot: string_field("islot"),
			visual_slot: string_field("vslot"),
			weapon_class: weapon_class(id),
			after_image: string_field("afterImage"),
			attack_speed: int_field("attackSpeed"),
			walk: int_field("walk"),
			stand: int_field("stand"),
			attack: int_field("attack"),
			sfx: string_field("sfx"),
			weekly,
			weekly_root: if weekly { root.child("weekly") } else { None },
			invisible_face: flag("invisibleFace"),
			extend_frame: flag("extendFrame"),
			vehicle_default_frame: info
				.child("vehicleDefaultFrame")
				.map(|n| n.as_string(""))
				.filter(|s| !s.is_empty()),
			root,
		}
	}

	/// The node holding this item's action subtrees, preferring the
	/// weekly alternate while one is present.
	pub fn action_root(&self) -> &Node {
		self.weekly_root.as_ref().unwrap_or(&self.root)
	}
}

/// Id-keyed item entry cache over the resource manager.
pub struct ItemCache {
	rm: ResourceManager,
	entries: RefCell<HashMap<i32, Option<Rc<ItemEntry>>>>,
}

impl ItemCache {
	/// Creates an empty cache reading through `rm`.
	pub fn new(rm: ResourceManager) -> Self {
		Self {
			rm,
			entries: RefCell::new(HashMap::new()),
		}
	}

	/// Loads an item entry, caching hits and misses.
	///
	/// A missing image or an id in no renderable category is a miss.
	pub fn load(&self, id: i32) -> Option<Rc<ItemEntry>> {
		if let Some(cached) = self.entries.borrow().get(&id) {
			return cached.clone();
		}

		let loaded = self.load_uncached(id);
		self.entries.borrow_mut().insert(id, loaded.clone());
		loaded
	}

	fn load_uncached(&self, id: i32) -> Option<Rc<ItemEntry>> {
		let path = item_image_path(id)?;
		let root = self.rm.get_property(&path);
		if root.child_count() == 0 {
			warn!("item {id} has no image at '{path}'");
			return None;
		}
		Some(Rc::new(ItemEntry::from_root(id, root)))
	}

	/// Number of cached lookups (hits and misses).
	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	/// True if nothing has been looked up yet.
	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}

	/// Drops all cached entries.
	pub fn clear(&self) {
		self.entries.borrow_mut().clear();
	}

	/// The resource manager this cache reads through.
	pub fn manager(&self) -> &ResourceManager {
		&self.rm
	}
}

impl std::fmt::Debug for ItemCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ItemCache({} cached)", self.entries.borrow().len())
	}
}
