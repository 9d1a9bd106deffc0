//! This module is separated into its own crate to keep the public facade of `maplet` in one place, and should not be used directly.

/// `use maplet::prelude::*;` to import commonly used items.
pub mod prelude;

// Re-export the subsystem crates for convenience
pub use maplet_avatar;
pub use maplet_wz;

// Re-export commonly used types at crate root
pub use maplet_avatar::{
	ActionTable, Appearance, Avatar, AvatarFrame, BodyPart, ComposeRequest, FaceLookCache,
	FrameCompositor, ItemCache, LayerOrder,
};
pub use maplet_wz::{Canvas, Node, ResourceManager, Source, SourceOptions, Value, WzError};
