//! Frame composition.
//!
//! The compositor turns (action, skin, equipped items) into an ordered
//! list of [`AvatarFrame`]s: one per action piece, each holding the
//! sprite layers of every visible item part, sorted by resolved z-index.
//!
//! Layers align through named attachment points. The body establishes
//! the anchor dictionary (`navel`, `neck`, `hand`, …); every later part
//! that shares an anchor name is positioned so the points coincide, and
//! contributes its remaining points to the dictionary. The body part
//! also supplies the frame's bounding rectangle and collision box.
//!
//! Missing data degrades, never fails: a missing item image drops that
//! item's layers, an item lacking the requested action drops the item
//! for the whole sequence (logged, unless the action is a development
//! action), and a broken canvas link drops the single layer.

use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use maplet_wz::{Canvas, Node, Value};
use serde::Serialize;

use crate::action::{ActionEntry, ActionPiece, ActionTable, is_development_action};
use crate::error::AvatarError;
use crate::item::{ItemCache, ItemEntry, is_weapon_sticker};
use crate::zmap::LayerOrder;

/// Action during which the body is hidden entirely.
pub const HIDE_BODY_ACTION: &str = "hideBody";

/// Death pose; equipment renders with the jump pose instead.
pub const ACTION_DEAD: &str = "dead";

/// Substitute pose for equipment while dead.
pub const ACTION_JUMP: &str = "jump";

/// Knock-out pose that hides the shield.
pub const ACTION_PVPKO: &str = "pvpko";

/// Siege pose that hides the weapon.
pub const ACTION_SUPERCANNON: &str = "supercannon";

/// Actions during which the weapon is never drawn.
pub const WEAPON_HIDE_ACTIONS: &[&str] =
	&["ladder", "rope", "sit", "ghostladder", "ghostrope"];

/// Base equipment id of body images; the skin id is added to it.
pub const BODY_ID_BASE: i32 = 2000;

/// Base equipment id of head images; the skin id is added to it.
pub const HEAD_ID_BASE: i32 = 12_000;

/// Equipment slots the compositor walks, in draw-merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BodyPart {
	/// Headwear
	Cap,
	/// Face accessory
	FaceAccessory,
	/// Eye accessory
	EyeAccessory,
	/// Earring
	Earring,
	/// Upper-body clothing
	Coat,
	/// Full-body clothing
	Longcoat,
	/// Lower-body clothing
	Pants,
	/// Footwear
	Shoes,
	/// Gloves
	Glove,
	/// Back cape
	Cape,
	/// Off-hand shield
	Shield,
	/// Main weapon
	Weapon,
	/// Hair
	Hair,
	/// Riding mount (not rendered by this compositor)
	TamingMob,
	/// Mount saddle (not rendered)
	Saddle,
	/// Mount equipment (not rendered)
	MobEquip,
}

impl BodyPart {
	/// Every slot, in the order the compositor walks them.
	pub const ALL: [Self; 16] = [
		Self::Cap,
		Self::FaceAccessory,
		Self::EyeAccessory,
		Self::Earring,
		Self::Coat,
		Self::Longcoat,
		Self::Pants,
		Self::Shoes,
		Self::Glove,
		Self::Cape,
		Self::Shield,
		Self::Weapon,
		Self::Hair,
		Self::TamingMob,
		Self::Saddle,
		Self::MobEquip,
	];
}

/// Integer rectangle in frame space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rect {
	/// Left edge
	pub left: i32,
	/// Top edge
	pub top: i32,
	/// Right edge (exclusive)
	pub right: i32,
	/// Bottom edge (exclusive)
	pub bottom: i32,
}

impl Rect {
	/// Rectangle from a top-left corner and a size.
	pub fn from_origin_size(left: i32, top: i32, width: i32, height: i32) -> Self {
		Self {
			left,
			top,
			right: left + width,
			bottom: top + height,
		}
	}

	/// Width of the rectangle.
	pub fn width(&self) -> i32 {
		self.right - self.left
	}

	/// Height of the rectangle.
	pub fn height(&self) -> i32 {
		self.bottom - self.top
	}

	/// True for a degenerate rectangle.
	pub fn is_empty(&self) -> bool {
		self.right <= self.left || self.bottom <= self.top
	}

	/// Smallest rectangle covering both.
	pub fn union(&self, other: &Self) -> Self {
		if self.is_empty() {
			return *other;
		}
		if other.is_empty() {
			return *self;
		}
		Self {
			left: self.left.min(other.left),
			top: self.top.min(other.top),
			right: self.right.max(other.right),
			bottom: self.bottom.max(other.bottom),
		}
	}
}

/// One sprite layer of a composed frame.
#[derive(Debug, Clone)]
pub struct SpriteLayer {
	/// Item the layer came from
	pub item_id: i32,
	/// Z-name (visual slot) the layer was filed under
	pub slot: String,
	/// Resolved z-index; layers draw in ascending order
	pub z: i32,
	/// The sprite surface
	pub canvas: Canvas,
	/// Draw position of the canvas top-left corner in frame space
	pub position: (i32, i32),
	/// Horizontal mirror
	pub flip: bool,
	/// Layer alpha `0..=255`
	pub alpha: i32,
	/// Color-mix percentage (`100` forces the base color)
	pub mix_percent: i32,
}

/// One composed animation frame.
#[derive(Debug, Clone)]
pub struct AvatarFrame {
	/// Layers sorted by ascending z
	pub layers: Vec<SpriteLayer>,
	/// Frame delay in milliseconds
	pub delay: i32,
	/// Whether the face is drawn on this frame
	pub show_face: bool,
	/// Positional nudge for this frame
	pub move_delta: (i32, i32),
	/// Minimum bounding rectangle of the body layers
	pub bounds: Rect,
	/// Body collision rectangle
	pub collision: Rect,
	/// Named attachment points (`brow`, `navel`, `head`, `muzzle`,
	/// `hand`, `tail`, …)
	pub anchors: HashMap<String, (i32, i32)>,
}

impl AvatarFrame {
	fn from_piece(piece: &ActionPiece) -> Self {
		Self {
			layers: Vec::new(),
			delay: piece.delay,
			show_face: piece.show_face,
			move_delta: piece.move_delta,
			bounds: Rect::default(),
			collision: Rect::default(),
			anchors: HashMap::new(),
		}
	}
}

/// Per-item modifiers for one merge pass.
#[derive(Debug, Clone, Copy, Default)]
struct MergeModifiers {
	/// Weapon-sticker id whose image replaces the item's
	sticker: i32,
	/// Color-mix percentage stamped on the produced layers
	mix_percent: i32,
	/// Body item: contributes bounds and collision
	is_body: bool,
	/// Weapon slot: honors per-piece `no_weapon`
	is_weapon: bool,
	/// Draw elf-ear parts
	elf_ear: bool,
	/// Suppress the missing-action log (used for the face item)
	quiet: bool,
}

/// Sprite part names that only render with the elf-ear modifier.
const ELF_EAR_PARTS: &[&str] = &["ear"];

/// Sprite part names never rendered by this compositor.
const SKIPPED_EAR_PARTS: &[&str] = &["lefEar", "highlefEar"];

/// Everything the compositor needs to resolve one request.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
	/// Action code to compose
	pub action: u16,
	/// Skin id (added to the body/head base ids)
	pub skin: i32,
	/// Face item id (`0` for none)
	pub face: i32,
	/// Job id
	pub job: i32,
	/// Equipped item ids per slot (`0`/absent for empty)
	pub equips: HashMap<BodyPart, i32>,
	/// Render elf ears
	pub elf_ear: bool,
	/// An invisible cash cape suppresses the hair layer
	pub invisible_cash_cape: bool,
	/// Mirror the finished frame list
	pub zigzag: bool,
	/// Hide the body (equipment stays)
	pub remove_body: bool,
	/// Weapon-sticker id (`0` for none)
	pub weapon_sticker: i32,
}

impl ComposeRequest {
	/// A bare request for an action with default appearance.
	pub fn new(action: u16) -> Self {
		Self {
			action,
			skin: 0,
			face: 0,
			job: 0,
			equips: HashMap::new(),
			elf_ear: false,
			invisible_cash_cape: false,
			zigzag: false,
			remove_body: false,
			weapon_sticker: 0,
		}
	}
}

/// Provider seam between the compositor and the item store.
pub trait ItemProvider {
	/// Metadata entry for an item id.
	fn entry(&self, id: i32) -> Option<Rc<ItemEntry>>;
}

impl ItemProvider for ItemCache {
	fn entry(&self, id: i32) -> Option<Rc<ItemEntry>> {
		self.load(id)
	}
}

/// The frame compositor.
pub struct FrameCompositor<P> {
	items: P,
	order: LayerOrder,
}

impl<P: ItemProvider> FrameCompositor<P> {
	/// Creates a compositor over an item provider and the layer tables.
	pub fn new(items: P, order: LayerOrder) -> Self {
		Self {
			items,
			order,
		}
	}

	/// The layer-order tables in use.
	pub fn layer_order(&self) -> &LayerOrder {
		&self.order
	}

	/// Composes the frames for a request.
	///
	/// Returns an empty list when the action is not loaded.
	pub fn compose(&self, table: &ActionTable, request: &ComposeRequest) -> Vec<AvatarFrame> {
		let Some(entry) = table.entry(request.action) else {
			warn!("compose: action {} is not loaded", request.action);
			return Vec::new();
		};

		let sticker = if is_weapon_sticker(request.weapon_sticker) {
			request.weapon_sticker
		} else {
			0
		};
		let hide_body = request.remove_body || entry.name == HIDE_BODY_ACTION;

		let mut frames: Vec<AvatarFrame> =
			entry.pieces.iter().map(AvatarFrame::from_piece).collect();

		// Body, head and face first, with neutral modifiers; they seed
		// the anchor dictionaries everything else aligns against.
		if !hide_body {
			self.merge_item(
				&mut frames,
				table,
				entry,
				BODY_ID_BASE + request.skin,
				MergeModifiers {
					is_body: true,
					elf_ear: request.elf_ear,
					..MergeModifiers::default()
				},
			);
			self.merge_item(
				&mut frames,
				table,
				entry,
				HEAD_ID_BASE + request.skin,
				MergeModifiers {
					elf_ear: request.elf_ear,
					..MergeModifiers::default()
				},
			);
		}
		if request.face > 0 {
			self.merge_item(
				&mut frames,
				table,
				entry,
				request.face,
				MergeModifiers {
					quiet: true,
					..MergeModifiers::default()
				},
			);
		}

		let equip_entry = self.equipment_entry(table, entry);

		for part in BodyPart::ALL {
			if matches!(part, BodyPart::TamingMob | BodyPart::Saddle | BodyPart::MobEquip) {
				continue;
			}
			let id = request.equips.get(&part).copied().unwrap_or(0);
			if id <= 0 {
				continue;
			}

			match part {
				BodyPart::Weapon => {
					if WEAPON_HIDE_ACTIONS.contains(&entry.name.as_str())
						|| entry.name == ACTION_SUPERCANNON
					{
						continue;
					}
				}
				BodyPart::Shield => {
					if entry.name == ACTION_PVPKO {
						continue;
					}
				}
				BodyPart::Hair => {
					if request.invisible_cash_cape {
						continue;
					}
				}
				_ => {}
			}

			let mut modifiers = MergeModifiers::default();
			if part == BodyPart::Cap {
				if request.remove_body {
					continue;
				}
				modifiers.mix_percent = 100;
			} else if request.remove_body {
				continue;
			}
			if part == BodyPart::Weapon {
				modifiers.sticker = sticker;
				modifiers.is_weapon = true;
			}

			self.merge_item(&mut frames, table, equip_entry, id, modifiers);
		}

		for frame in &mut frames {
			frame.layers.sort_by_key(|layer| layer.z);
		}

		if request.zigzag && frames.len() > 1 {
			for index in (0..frames.len() - 1).rev() {
				frames.push(frames[index].clone());
			}
		}

		frames
	}

	/// The action entry equipment renders with: `dead` substitutes
	/// `jump`.
	fn equipment_entry<'t>(&self, table: &'t ActionTable, entry: &'t ActionEntry) -> &'t ActionEntry {
		if entry.name == ACTION_DEAD
			&& let Some(jump) = table.code_of(ACTION_JUMP).and_then(|code| table.entry(code))
		{
			return jump;
		}
		entry
	}

	/// Merges one item's sprite layers into every frame.
	fn merge_item(
		&self,
		frames: &mut [AvatarFrame],
		table: &ActionTable,
		entry: &ActionEntry,
		item_id: i32,
		modifiers: MergeModifiers,
	) {
		let Some(item) = self.items.entry(item_id) else {
			return;
		};
		let root = match modifiers.sticker {
			sticker if sticker > 0 => match self.items.entry(sticker) {
				Some(sticker_item) => sticker_item.action_root().clone(),
				None => item.action_root().clone(),
			},
			_ => item.action_root().clone(),
		};

		// An item lacking the whole action drops out of the sequence.
		let referenced: Vec<&str> = entry
			.pieces
			.iter()
			.filter_map(|piece| table.name_of(piece.action))
			.collect();
		if let Some(missing) = referenced.iter().find(|name| root.child(name).is_none()) {
			if !modifiers.quiet
				&& entry
					.pieces
					.iter()
					.any(|piece| !is_development_action(piece.action))
			{
				warn!(
					"{}",
					AvatarError::ActionMissingOnItem {
						item: item_id,
						action: (*missing).to_owned(),
					}
				);
			}
			return;
		}

		for (index, frame) in frames.iter_mut().enumerate() {
			let Some(piece) = entry.pieces.get(index) else {
				continue;
			};
			let Some(action_name) = table.name_of(piece.action) else {
				continue;
			};
			if modifiers.is_weapon && piece.no_weapon {
				continue;
			}
			let Some(frame_node) = root
				.child(action_name)
				.and_then(|action| action.child(&piece.frame.to_string()))
			else {
				continue;
			};

			self.merge_frame_node(frame, &frame_node, &item, piece, &modifiers);
		}
	}

	/// Merges the sprite parts of one item frame node into a frame.
	fn merge_frame_node(
		&self,
		frame: &mut AvatarFrame,
		frame_node: &Node,
		item: &ItemEntry,
		piece: &ActionPiece,
		modifiers: &MergeModifiers,
	) {
		for part in frame_node.children() {
			if SKIPPED_EAR_PARTS.contains(&part.name())
				|| (!modifiers.elf_ear && ELF_EAR_PARTS.contains(&part.name()))
			{
				continue;
			}
			let Some(canvas) = part.as_canvas() else {
				continue;
			};
			let Some(resolved) = part.resolve_linked(0) else {
				continue;
			};

			// A z child is either a slot name (resolved through the
			// z-map) or a bare integer index.
			let (z, slot) = match resolved.child("z") {
				Some(node) => match node.value() {
					Value::String(name) if !name.is_empty() => (self.order.z_of(&name), name),
					Value::String(_) => (self.order.z_of(part.name()), part.name().to_owned()),
					_ => (node.as_int(0), part.name().to_owned()),
				},
				None => (self.order.z_of(part.name()), part.name().to_owned()),
			};

			let origin = resolved
				.child("origin")
				.and_then(|n| n.as_vector())
				.unwrap_or((0, 0));
			let map_points: Vec<(String, (i32, i32))> = resolved
				.child("map")
				.map(|map| {
					map.children()
						.iter()
						.filter_map(|p| p.as_vector().map(|v| (p.name().to_owned(), v)))
						.collect()
				})
				.unwrap_or_default();

			// Anchor alignment: pin the first shared point, then offer
			// the rest to the dictionary.
			let position = map_points
				.iter()
				.find_map(|(name, point)| {
					frame
						.anchors
						.get(name)
						.map(|anchor| (anchor.0 - point.0, anchor.1 - point.1))
				})
				.unwrap_or((0, 0));
			for (name, point) in &map_points {
				frame
					.anchors
					.entry(name.clone())
					.or_insert((position.0 + point.0, position.1 + point.1));
			}

			let top_left = (position.0 - origin.0, position.1 - origin.1);
			let rect = Rect::from_origin_size(
				top_left.0,
				top_left.1,
				canvas.width() as i32,
				canvas.height() as i32,
			);
			if modifiers.is_body {
				frame.bounds = frame.bounds.union(&rect);
			}

			frame.layers.push(SpriteLayer {
				item_id: item.id,
				slot,
				z,
				canvas,
				position: top_left,
				flip: piece.flip,
				alpha: piece.alpha,
				mix_percent: modifiers.mix_percent,
			});
		}

		if modifiers.is_body {
			let lt = frame_node.child("lt").and_then(|n| n.as_vector());
			let rb = frame_node.child("rb").and_then(|n| n.as_vector());
			if let (Some(lt), Some(rb)) = (lt, rb) {
				frame.collision = Rect {
					left: lt.0,
					top: lt.1,
					right: rb.0,
					bottom: rb.1,
				};
			}
		}
	}
}

impl<P> std::fmt::Debug for FrameCompositor<P> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "FrameCompositor(z-map: {} entries)", self.order.zmap.len())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::action::ActionTable;
	use crate::zmap::{SlotMap, ZMap};
	use maplet_wz::Value;
	use std::cell::RefCell;

	struct StubItems {
		entries: RefCell<HashMap<i32, Rc<ItemEntry>>>,
	}

	impl StubItems {
		fn new() -> Self {
			Self {
				entries: RefCell::new(HashMap::new()),
			}
		}

		fn insert(&self, id: i32, root: Node) {
			self.entries
				.borrow_mut()
				.insert(id, Rc::new(ItemEntry::from_root(id, root)));
		}
	}

	impl ItemProvider for &StubItems {
		fn entry(&self, id: i32) -> Option<Rc<ItemEntry>> {
			self.entries.borrow().get(&id).cloned()
		}
	}

	fn canvas_part(name: &str, z: &str, origin: (i32, i32), map: &[(&str, (i32, i32))]) -> Node {
		let part = Node::new(name, Value::Canvas(Canvas::from_rgba(2, 2, vec![0u8; 16])));
		part.append_child(Node::new("z", Value::String(z.into())));
		part.append_child(Node::new("origin", Value::Vector(origin.0, origin.1)));
		let map_node = Node::sub_property("map");
		for (anchor, point) in map {
			map_node.append_child(Node::new(*anchor, Value::Vector(point.0, point.1)));
		}
		part.append_child(map_node);
		part
	}

	/// Body image: two actions, each one frame with a body canvas that
	/// exposes a navel anchor.
	fn body_root() -> Node {
		let root = Node::image("00002000.img");
		for action in ["stand1", "jump"] {
			let action_node = Node::sub_property(action);
			let frame = Node::sub_property("0");
			frame.append_child(canvas_part("body", "body", (1, 1), &[("navel", (5, 6))]));
			frame.append_child(Node::new("delay", Value::Int(180)));
			frame.append_child(Node::new("lt", Value::Vector(-9, -31)));
			frame.append_child(Node::new("rb", Value::Vector(9, 0)));
			action_node.append_child(frame);
			root.append_child(action_node);
		}
		root
	}

	fn item_root(name: &str, z: &str, map: &[(&str, (i32, i32))], actions: &[&str]) -> Node {
		let root = Node::image(name);
		for action in actions {
			let action_node = Node::sub_property(*action);
			let frame = Node::sub_property("0");
			frame.append_child(canvas_part(name, z, (0, 0), map));
			action_node.append_child(frame);
			root.append_child(action_node);
		}
		root
	}

	fn layer_order() -> LayerOrder {
		let zmap = Node::sub_property("zmap.img");
		for name in ["weapon", "body", "mailArm", "cap"] {
			zmap.append_child(Node::new(name, Value::Null));
		}
		LayerOrder {
			zmap: ZMap::load(&zmap),
			smap: SlotMap::default(),
		}
	}

	fn table() -> ActionTable {
		ActionTable::from_body_image(&body_root()).unwrap()
	}

	fn compositor(items: &StubItems) -> FrameCompositor<&StubItems> {
		FrameCompositor::new(items, layer_order())
	}

	#[test_log::test]
	fn test_body_only_composition() {
		let items = StubItems::new();
		items.insert(BODY_ID_BASE, body_root());
		let table = table();
		let compositor = compositor(&items);

		let frames = compositor.compose(&table, &ComposeRequest::new(0));
		assert_eq!(frames.len(), 1);
		let frame = &frames[0];
		assert_eq!(frame.layers.len(), 1);
		assert_eq!(frame.layers[0].slot, "body");
		// Canvas is 2×2 with origin (1,1) and no prior anchors.
		assert_eq!(frame.layers[0].position, (-1, -1));
		assert_eq!(frame.bounds, Rect::from_origin_size(-1, -1, 2, 2));
		assert_eq!(frame.collision, Rect { left: -9, top: -31, right: 9, bottom: 0 });
		assert_eq!(frame.anchors.get("navel"), Some(&(5, 6)));
	}

	#[test]
	fn test_anchor_alignment_and_z_order() {
		let items = StubItems::new();
		items.insert(BODY_ID_BASE, body_root());
		// A coat that pins its navel at (2, 2): its position must be the
		// body navel minus its own map point.
		items.insert(
			1_040_002,
			item_root("coat", "mailArm", &[("navel", (2, 2))], &["stand1", "jump"]),
		);
		let table = table();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(0);
		request.equips.insert(BodyPart::Coat, 1_040_002);
		let frames = compositor.compose(&table, &request);
		let frame = &frames[0];
		assert_eq!(frame.layers.len(), 2);

		// z: "weapon" -1, "body" -2, "mailArm" -3, "cap" -4; ascending
		// order puts mailArm before body.
		assert_eq!(frame.layers[0].slot, "mailArm");
		assert_eq!(frame.layers[1].slot, "body");
		assert!(frame.layers[0].z < frame.layers[1].z);

		// navel (5,6) minus map point (2,2) = position (3,4).
		assert_eq!(frame.layers[0].position, (3, 4));
	}

	#[test]
	fn test_missing_item_is_tolerated() {
		let items = StubItems::new();
		items.insert(BODY_ID_BASE, body_root());
		let table = table();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(0);
		request.equips.insert(BodyPart::Cap, 1_002_357);
		let frames = compositor.compose(&table, &request);
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].layers.len(), 1);
	}

	#[test]
	fn test_item_missing_action_drops_item() {
		let items = StubItems::new();
		items.insert(BODY_ID_BASE, body_root());
		// Weapon only carries "jump", not "stand1".
		items.insert(1_302_000, item_root("weapon", "weapon", &[], &["jump"]));
		let table = table();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(0);
		request.equips.insert(BodyPart::Weapon, 1_302_000);
		let frames = compositor.compose(&table, &request);
		assert_eq!(frames[0].layers.len(), 1);
	}

	#[test]
	fn test_dead_substitutes_jump_for_equipment() {
		let items = StubItems::new();
		let body = body_root();
		// Give the body a dead action of its own.
		let dead = Node::sub_property("dead");
		let frame = Node::sub_property("0");
		frame.append_child(canvas_part("body", "body", (0, 0), &[]));
		dead.append_child(frame);
		body.append_child(dead);
		items.insert(BODY_ID_BASE, body.clone());
		// Cap exists only for "jump": still renders during "dead".
		items.insert(1_002_357, item_root("cap", "cap", &[], &["jump"]));

		let table = ActionTable::from_body_image(&body).unwrap();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(table.code_of("dead").unwrap());
		request.equips.insert(BodyPart::Cap, 1_002_357);
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.iter().any(|l| l.slot == "cap"));
	}

	#[test]
	fn test_weapon_hidden_on_hide_actions() {
		let items = StubItems::new();
		let body = body_root();
		let ladder = Node::sub_property("ladder");
		let frame = Node::sub_property("0");
		frame.append_child(canvas_part("body", "body", (0, 0), &[]));
		ladder.append_child(frame);
		body.append_child(ladder);
		items.insert(BODY_ID_BASE, body.clone());
		items.insert(
			1_302_000,
			item_root("weapon", "weapon", &[], &["stand1", "jump", "ladder"]),
		);

		let table = ActionTable::from_body_image(&body).unwrap();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(table.code_of("ladder").unwrap());
		request.equips.insert(BodyPart::Weapon, 1_302_000);
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.iter().all(|l| l.slot != "weapon"));

		// On stand1 the weapon is present.
		let mut request = ComposeRequest::new(table.code_of("stand1").unwrap());
		request.equips.insert(BodyPart::Weapon, 1_302_000);
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.iter().any(|l| l.slot == "weapon"));
	}

	#[test]
	fn test_cap_mix_percent_and_remove_body() {
		let items = StubItems::new();
		items.insert(BODY_ID_BASE, body_root());
		items.insert(1_002_357, item_root("cap", "cap", &[], &["stand1", "jump"]));
		let table = table();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(0);
		request.equips.insert(BodyPart::Cap, 1_002_357);
		let frames = compositor.compose(&table, &request);
		let cap = frames[0].layers.iter().find(|l| l.slot == "cap").unwrap();
		assert_eq!(cap.mix_percent, 100);

		// remove-body drops both the body and the cap.
		request.remove_body = true;
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.is_empty());
	}

	#[test]
	fn test_zigzag_mirrors_frames() {
		let items = StubItems::new();
		let body = Node::image("00002000.img");
		let action = Node::sub_property("walk1");
		for i in 0..3 {
			let frame = Node::sub_property(i.to_string());
			frame.append_child(canvas_part("body", "body", (0, 0), &[]));
			frame.append_child(Node::new("delay", Value::Int(100 + i)));
			action.append_child(frame);
		}
		body.append_child(action);
		items.insert(BODY_ID_BASE, body.clone());

		let table = ActionTable::from_body_image(&body).unwrap();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(0);
		request.zigzag = true;
		let frames = compositor.compose(&table, &request);
		// 3 frames mirror into 3 + 2 = 5: [0, 1, 2, 1, 0].
		assert_eq!(frames.len(), 5);
		assert_eq!(frames[3].delay, frames[1].delay);
		assert_eq!(frames[4].delay, frames[0].delay);
	}

	#[test]
	fn test_elf_ear_parts_gated() {
		let items = StubItems::new();
		let body = Node::image("00002000.img");
		let action = Node::sub_property("stand1");
		let frame = Node::sub_property("0");
		frame.append_child(canvas_part("body", "body", (0, 0), &[]));
		frame.append_child(canvas_part("ear", "body", (0, 0), &[]));
		frame.append_child(canvas_part("lefEar", "body", (0, 0), &[]));
		action.append_child(frame);
		body.append_child(action);
		items.insert(BODY_ID_BASE, body.clone());

		let table = ActionTable::from_body_image(&body).unwrap();
		let compositor = compositor(&items);

		let request = ComposeRequest::new(0);
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.iter().all(|l| l.item_id == BODY_ID_BASE));
		assert_eq!(frames[0].layers.len(), 1);

		let mut request = ComposeRequest::new(0);
		request.elf_ear = true;
		let frames = compositor.compose(&table, &request);
		// The elf ear joins; the unused ear variants never render.
		assert_eq!(frames[0].layers.len(), 2);
	}

	#[test]
	fn test_no_weapon_piece_hides_weapon_frame() {
		let items = StubItems::new();
		let body = body_root();
		body.descend("stand1/0")
			.unwrap()
			.append_child(Node::new("noweapon", Value::Int(1)));
		items.insert(BODY_ID_BASE, body.clone());
		items.insert(
			1_302_000,
			item_root("weapon", "weapon", &[], &["stand1", "jump"]),
		);

		let table = ActionTable::from_body_image(&body).unwrap();
		let compositor = compositor(&items);

		let mut request = ComposeRequest::new(table.code_of("stand1").unwrap());
		request.equips.insert(BodyPart::Weapon, 1_302_000);
		let frames = compositor.compose(&table, &request);
		assert!(frames[0].layers.iter().all(|l| l.slot != "weapon"));
	}

	#[test]
	fn test_unloaded_action_is_empty() {
		let items = StubItems::new();
		let table = table();
		let compositor = compositor(&items);
		assert!(compositor.compose(&table, &ComposeRequest::new(999)).is_empty());
	}
}
