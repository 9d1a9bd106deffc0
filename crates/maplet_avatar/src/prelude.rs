//! Prelude module for `maplet_avatar`.
//!
//! # Examples
//!
//! ```no_run
//! use maplet_avatar::prelude::*;
//!
//! let mut avatar = Avatar::new(Appearance::default());
//! avatar.play_once(40);
//! ```

#[doc(inline)]
pub use crate::{
	// Action table
	ActionEntry,
	ActionPiece,
	ActionTable,
	// Avatar state
	Appearance,
	Avatar,

	// Errors
	AvatarError,
	// Frame composition
	AvatarFrame,
	BodyPart,
	ComposeRequest,
	// Face composition
	FaceFrame,
	FaceLook,
	FaceLookCache,
	FaceLookOptions,
	FrameCompositor,

	// Item metadata
	ItemCache,
	ItemEntry,
	// Layer ordering
	LayerOrder,
	PlayState,
	SlotMap,
	SpriteLayer,
	ZMap,
};

#[doc(inline)]
pub use crate::action::{ACTION_COUNT, BLINK_ACTION, RESERVED_ACTION};

#[doc(inline)]
pub use crate::avatar::{pack_move_action, unpack_move_action};

#[doc(inline)]
pub use crate::face::{EMOTION_COUNT, emotion_name};
