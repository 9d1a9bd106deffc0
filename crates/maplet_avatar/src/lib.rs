//! Character animation pipeline for the `maplet-rs` project.
//!
//! Everything a character shows on screen is data-driven from the
//! packaged asset store ([`maplet_wz`]): which frames an action plays,
//! which sprite layers each frame stacks, where equipment attaches, and
//! how the face animates. This crate loads those tables and advances
//! them:
//!
//! - [`action`]: the dense action table (frame sequences and delays)
//! - [`item`]: per-equipped-item metadata, cached by id
//! - [`zmap`]: the z-order and slot-alias tables
//! - [`compose`]: the frame compositor (action + equipment → layers)
//! - [`face`]: the face+accessory compositor with its bounded cache
//! - [`avatar`]: the per-character animation state machine
//!
//! # Examples
//!
//! ```no_run
//! use maplet_avatar::prelude::*;
//! use maplet_wz::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rm = ResourceManager::initialize("data", SourceOptions::default())?;
//! let table = ActionTable::load(&rm)?;
//! let order = LayerOrder::load(&rm);
//! let compositor = FrameCompositor::new(ItemCache::new(rm), order);
//!
//! let mut request = ComposeRequest::new(table.code_of("stand1").unwrap_or(0));
//! request.equips.insert(BodyPart::Cap, 1_002_357);
//! let frames = compositor.compose(&table, &request);
//! println!("stand1 composes {} frame(s)", frames.len());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod avatar;
pub mod compose;
pub mod error;
pub mod face;
pub mod item;
pub mod zmap;

/// `use maplet_avatar::prelude::*;` to import commonly used items.
pub mod prelude;

pub use action::{ActionEntry, ActionPiece, ActionTable};
pub use avatar::{Appearance, Avatar, PlayState};
pub use compose::{AvatarFrame, BodyPart, ComposeRequest, FrameCompositor, SpriteLayer};
pub use error::AvatarError;
pub use face::{FaceFrame, FaceLook, FaceLookCache, FaceLookOptions};
pub use item::{ItemCache, ItemEntry};
pub use zmap::{LayerOrder, SlotMap, ZMap};
