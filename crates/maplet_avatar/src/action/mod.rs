//! The action table.
//!
//! An action is a named sequence of animation frames driving a character
//! pose. The table is dense: every action lives at an integer code in
//! `[0, ACTION_COUNT)`, and the compositor and state machine address
//! actions by code only.
//!
//! # Loading
//!
//! The table is parsed from the body item's image (equipment id 2000).
//! Its children are action nodes keyed by name; binding consumes them in
//! on-disk order, assigning consecutive codes with a permanent hole at
//! [`RESERVED_ACTION`]. Actions in [`GHOST_ACTIONS`] store their frames
//! under the child `"1"` instead of at the node itself.
//!
//! Two load paths exist per action:
//!
//! - **pieced** (the first frame carries an `action` child): every frame
//!   is a reference to another action's frame. `show-face` is copied
//!   from the referenced piece, and a negative delay always accumulates
//!   into the event delay.
//! - **plain**: frames reference the action itself. `show-face` comes
//!   from the data. Negative delays accumulate into the event delay only
//!   for codes in [`PB_DELAY_ACTIONS`]; otherwise the event delay derives
//!   from the totals. A zigzag action mirrors frames `[1, n-1)` in
//!   reverse onto the end, producing `2n - 2` output frames.

pub mod piece;
pub mod random_move;

pub use piece::{ActionPiece, DEFAULT_PIECE_DELAY, MAX_EMOTION};
pub use random_move::RandomMoveTable;

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;

use log::warn;
use maplet_wz::{Node, ResourceManager};
use serde::Serialize;

use crate::error::AvatarError;

/// Size of the dense action code space.
pub const ACTION_COUNT: usize = 1310;

/// Code that is never populated; the loader skips over it.
pub const RESERVED_ACTION: u16 = 58;

/// Codes whose frames live under the child `"1"` of the action node.
pub const GHOST_ACTIONS: RangeInclusive<u16> = 132..=139;

/// Codes where a plain action's negative delays become event delays.
pub const PB_DELAY_ACTIONS: RangeInclusive<u16> = 981..=1050;

/// Code of the blink action; pieces referencing it mark their action as
/// blink-linked.
pub const BLINK_ACTION: u16 = 33;

/// Equipment id of the body item whose image defines the table.
pub const BODY_ITEM_ID: i32 = 2000;

/// Archive path of the body item image.
pub const BODY_IMAGE_PATH: &str = "Character/00002000.img";

/// Archive path of the random-move table image.
pub const RANDOM_MOVE_PATH: &str = "Etc/RandomMoveAction.img";

/// One loaded action.
#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
	/// Action name, unique across the table
	pub name: String,
	/// Mirror frames into a palindrome
	pub zigzag: bool,
	/// Frames reference other actions
	pub pieced: bool,
	/// Sum of all output piece delays in milliseconds
	pub total_delay: i32,
	/// Delay before the action's event point in milliseconds
	pub event_delay: i32,
	/// Sub-avatar action reference, when present
	pub sub_avatar: Option<String>,
	/// Frame index the action repeats from (`-1` when it loops whole)
	pub repeat: i32,
	/// Output frames in playback order
	pub pieces: Vec<ActionPiece>,
}

impl ActionEntry {
	/// Number of playback frames.
	pub fn frame_count(&self) -> usize {
		self.pieces.len()
	}

	/// Piece at a playback index, if in range.
	pub fn piece(&self, index: usize) -> Option<&ActionPiece> {
		self.pieces.get(index)
	}
}

/// The dense action table plus its sideband indices.
pub struct ActionTable {
	entries: Vec<Option<ActionEntry>>,
	codes: HashMap<String, u16>,
	rotating: HashSet<u16>,
	blink_linked: HashSet<u16>,
	random_moves: RandomMoveTable,
}

impl ActionTable {
	/// Loads the table through the resource manager: the body image for
	/// the actions, then the random-move table.
	pub fn load(rm: &ResourceManager) -> Result<Self, AvatarError> {
		let body = rm.get_property(BODY_IMAGE_PATH);
		let mut table = Self::from_body_image(&body)?;
		table.random_moves = RandomMoveTable::load(&rm.get_property(RANDOM_MOVE_PATH), &table.codes);
		Ok(table)
	}

	/// Builds the table from a body image node.
	///
	/// Plain actions load first so that pieced actions can copy
	/// `show-face` from the frames they reference.
	pub fn from_body_image(body: &Node) -> Result<Self, AvatarError> {
		let actions = body.children();
		if actions.is_empty() {
			return Err(AvatarError::MissingActionSource);
		}

		// Bind names to codes in on-disk order, leaving the reserved hole.
		let mut codes = HashMap::new();
		let mut bound: Vec<(u16, Node)> = Vec::with_capacity(actions.len());
		let mut code = 0u16;
		for node in actions {
			if code == RESERVED_ACTION {
				code += 1;
			}
			if (code as usize) >= ACTION_COUNT {
				warn!("body image exceeds {ACTION_COUNT} actions, rest ignored");
				break;
			}
			if codes.contains_key(node.name()) {
				warn!("duplicate action name '{}' ignored", node.name());
				continue;
			}
			codes.insert(node.name().to_owned(), code);
			bound.push((code, node));
			code += 1;
		}

		let mut table = Self {
			entries: std::iter::repeat_with(|| None).take(ACTION_COUNT).collect(),
			codes,
			rotating: HashSet::new(),
			blink_linked: HashSet::new(),
			random_moves: RandomMoveTable::default(),
		};

		for pieced_pass in [false, true] {
			for (code, node) in &bound {
				let frames = match action_frames_node(*code, node) {
					Some(frames) => frames,
					None => {
						warn!("action '{}' has no frame container", node.name());
						continue;
					}
				};
				if is_pieced(&frames) != pieced_pass {
					continue;
				}
				let entry = table.load_action(*code, node.name(), &frames, pieced_pass);
				table.index_sidebands(*code, &entry);
				table.entries[*code as usize] = Some(entry);
			}
		}
		Ok(table)
	}

	fn load_action(&self, code: u16, name: &str, frames: &Node, pieced: bool) -> ActionEntry {
		let zigzag = frames.child("zigzag").is_some_and(|n| n.as_int(0) != 0);
		let sub_avatar = frames
			.child("subAvatarAction")
			.map(|n| n.as_string(""))
			.filter(|s| !s.is_empty());
		let repeat = frames.child("repeat").map_or(-1, |n| n.as_int(-1));
		let frame_count = count_frames(frames);

		let mut entry = ActionEntry {
			name: name.to_owned(),
			zigzag,
			pieced,
			total_delay: 0,
			event_delay: 0,
			sub_avatar,
			repeat,
			pieces: Vec::with_capacity(frame_count),
		};

		if pieced {
			self.load_pieced(code, frames, frame_count, &mut entry);
		} else {
			self.load_plain(code, frames, frame_count, &mut entry);
		}
		entry.total_delay = entry.pieces.iter().map(|p| p.delay).sum();
		entry
	}

	fn load_pieced(&self, code: u16, frames: &Node, frame_count: usize, entry: &mut ActionEntry) {
		for index in 0..frame_count {
			let Some(frame) = frames.child(&index.to_string()) else {
				continue;
			};
			let referenced = frame
				.child("action")
				.map(|n| n.as_string(""))
				.and_then(|name| self.codes.get(&name).copied());
			let Some(referenced) = referenced else {
				warn!("action {code} frame {index} references an unknown action");
				continue;
			};
			let frame_idx = frame.child("frame").map_or(0, |n| n.as_int(0));
			let (mut piece, raw_delay) = ActionPiece::from_frame_node(&frame, referenced, frame_idx);

			// Negative delays are always event delays on this path.
			if raw_delay < 0 {
				entry.event_delay += -raw_delay;
			}

			piece.show_face = self
				.entry(referenced)
				.and_then(|target| target.piece(frame_idx.max(0) as usize))
				.map_or(true, |target| target.show_face);

			entry.pieces.push(piece);
		}
	}

	fn load_plain(&self, code: u16, frames: &Node, frame_count: usize, entry: &mut ActionEntry) {
		let mut pb_event_delay = 0i32;
		for index in 0..frame_count {
			let Some(frame) = frames.child(&index.to_string()) else {
				continue;
			};
			let (piece, raw_delay) = ActionPiece::from_frame_node(&frame, code, index as i32);
			if raw_delay < 0 && PB_DELAY_ACTIONS.contains(&code) {
				pb_event_delay += -raw_delay;
			}
			entry.pieces.push(piece);
		}

		if entry.zigzag && entry.pieces.len() >= 2 {
			// Mirror [1, n-1) in reverse: n frames become 2n - 2.
			for index in (1..entry.pieces.len() - 1).rev() {
				entry.pieces.push(entry.pieces[index].clone());
			}
		}

		entry.event_delay = if PB_DELAY_ACTIONS.contains(&code) {
			pb_event_delay
		} else if entry.zigzag || entry.pieces.is_empty() {
			0
		} else {
			let forward_sum: i32 = entry.pieces.iter().map(|p| p.delay).sum();
			forward_sum - entry.pieces.last().map_or(0, |p| p.delay)
		};
	}

	fn index_sidebands(&mut self, code: u16, entry: &ActionEntry) {
		if entry.pieces.iter().any(|p| p.rotate != 0) {
			self.rotating.insert(code);
		}
		if entry.pieces.iter().any(|p| p.action == BLINK_ACTION) {
			self.blink_linked.insert(code);
		}
	}

	/// The loaded action at `code`, if any.
	pub fn entry(&self, code: u16) -> Option<&ActionEntry> {
		self.entries.get(code as usize).and_then(Option::as_ref)
	}

	/// Code bound to an action name.
	pub fn code_of(&self, name: &str) -> Option<u16> {
		self.codes.get(name).copied()
	}

	/// Name bound to an action code.
	pub fn name_of(&self, code: u16) -> Option<&str> {
		self.entry(code).map(|entry| entry.name.as_str())
	}

	/// True if any piece of the action rotates.
	pub fn is_rotating(&self, code: u16) -> bool {
		self.rotating.contains(&code)
	}

	/// True if any piece references the blink action.
	pub fn is_blink_linked(&self, code: u16) -> bool {
		self.blink_linked.contains(&code)
	}

	/// The random-move substitution table.
	pub fn random_moves(&self) -> &RandomMoveTable {
		&self.random_moves
	}

	/// Number of loaded actions.
	pub fn loaded_count(&self) -> usize {
		self.entries.iter().filter(|entry| entry.is_some()).count()
	}

	/// Iterates `(code, entry)` over loaded actions in code order.
	pub fn iter(&self) -> impl Iterator<Item = (u16, &ActionEntry)> {
		self.entries
			.iter()
			.enumerate()
			.filter_map(|(code, entry)| entry.as_ref().map(|e| (code as u16, e)))
	}
}

impl std::fmt::Debug for ActionTable {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "ActionTable({} of {ACTION_COUNT} loaded)", self.loaded_count())
	}
}

/// True for action codes that only exist in development data cuts;
/// items are allowed to lack these without an error log.
pub fn is_development_action(code: u16) -> bool {
	GHOST_ACTIONS.contains(&code) || PB_DELAY_ACTIONS.contains(&code)
}

/// Resolves the node holding an action's frames: the ghost range nests
/// them one level down under `"1"`.
fn action_frames_node(code: u16, node: &Node) -> Option<Node> {
	if GHOST_ACTIONS.contains(&code) {
		node.child("1")
	} else {
		Some(node.clone())
	}
}

/// Counts the numeric frame children (`"0"`, `"1"`, …) of an action
/// node; flag children (`zigzag`, `subAvatarAction`, `repeat`) do not
/// count as frames.
fn count_frames(frames: &Node) -> usize {
	frames
		.children()
		.iter()
		.filter(|child| child.name().bytes().all(|b| b.is_ascii_digit()))
		.count()
}

/// True if the first frame references another action.
fn is_pieced(frames: &Node) -> bool {
	frames
		.child("0")
		.is_some_and(|frame| frame.has_child("action"))
}
