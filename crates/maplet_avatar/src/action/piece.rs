//! Action piece records.

use maplet_wz::Node;
use serde::Serialize;

/// Default per-frame delay in milliseconds when the data omits one.
pub const DEFAULT_PIECE_DELAY: i32 = 150;

/// Default layer alpha.
pub const DEFAULT_PIECE_ALPHA: i32 = 255;

/// Highest valid emotion code; anything outside `0..=MAX_EMOTION` clamps
/// to `-1`.
pub const MAX_EMOTION: i32 = 38;

/// One frame reference inside an action.
///
/// A piece names the action whose sprite data supplies the frame
/// (`action`/`frame`) plus the per-frame presentation modifiers. For
/// plain (non-pieced) actions each piece references its own action; for
/// pieced actions the references point at other actions' frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionPiece {
	/// Referenced action code
	pub action: u16,
	/// Frame index into the referenced action's sprite data
	pub frame: i32,
	/// Positive frame delay in milliseconds
	pub delay: i32,
	/// Horizontal mirror
	pub flip: bool,
	/// Rotation in degrees
	pub rotate: i32,
	/// Layer alpha, `0..=255`
	pub alpha: i32,
	/// Lock the facing direction for this frame
	pub direction_fix: bool,
	/// Emotion code forced by this frame (`0..=38`, or `-1` for none)
	pub emotion: i32,
	/// Whether the face is drawn on this frame
	pub show_face: bool,
	/// Secondary weapon visible
	pub has_weapon2: bool,
	/// Weapon hidden
	pub no_weapon: bool,
	/// Positional nudge applied for this frame
	pub move_delta: (i32, i32),
}

impl ActionPiece {
	/// Reads the fields shared by both load paths from a frame node.
	///
	/// `delay` is returned raw (possibly negative); the caller applies
	/// the event-delay discipline. `show_face` defaults to visible and is
	/// overwritten by the pieced path.
	pub(crate) fn from_frame_node(node: &Node, action: u16, frame: i32) -> (Self, i32) {
		let raw_delay = node
			.child("delay")
			.map_or(DEFAULT_PIECE_DELAY, |n| n.as_int(DEFAULT_PIECE_DELAY));
		let emotion = node.child("emotion").map_or(-1, |n| n.as_int(-1));
		let piece = Self {
			action,
			frame,
			delay: raw_delay.abs().max(1),
			flip: node.child("flip").is_some_and(|n| n.as_int(0) != 0),
			rotate: node.child("rotate").map_or(0, |n| n.as_int(0)),
			alpha: node
				.child("alpha")
				.map_or(DEFAULT_PIECE_ALPHA, |n| n.as_int(DEFAULT_PIECE_ALPHA)),
			direction_fix: node.child("justDir").is_some_and(|n| n.as_int(0) != 0),
			emotion: if (0..=MAX_EMOTION).contains(&emotion) {
				emotion
			} else {
				-1
			},
			show_face: node.child("face").map_or(true, |n| n.as_int(1) != 0),
			has_weapon2: node.child("weapon2").is_some_and(|n| n.as_int(0) != 0),
			no_weapon: node.child("noweapon").is_some_and(|n| n.as_int(0) != 0),
			move_delta: node
				.child("move")
				.and_then(|n| n.as_vector())
				.unwrap_or((0, 0)),
		};
		(piece, raw_delay)
	}
}
