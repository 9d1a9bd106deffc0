//! Packaged asset store support for the `maplet-rs` project.
//!
//! The game ships every asset — images, animations, sounds, gameplay
//! metadata — inside proprietary encrypted archives that present one
//! virtual tree. This crate reads them:
//!
//! - [`crypto`]: AES-derived XOR keystream and tolerant zlib inflation
//! - [`reader`]: memory-mapped cursor with the format's primitive reads
//! - [`node`]: the lazy-loading property tree
//! - [`source`]: the two physical layouts (single file, shard package)
//! - [`pixel`] / [`canvas`]: pixel payload decoding to RGBA8
//! - [`manager`]: the named-archive table fronting path queries
//!
//! Archives are strictly read-only.
//!
//! # Examples
//!
//! ```no_run
//! use maplet_wz::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rm = ResourceManager::initialize("data", SourceOptions::default())?;
//! let cap = rm.get_property("Character/Cap/01002357.img/info");
//! if let Some(icon) = cap.child("icon").and_then(|n| n.as_canvas()) {
//! 	println!("icon is {}×{}", icon.width(), icon.height());
//! }
//! # Ok(())
//! # }
//! ```

pub mod canvas;
pub mod crypto;
pub mod error;
pub mod manager;
pub mod node;
pub mod pixel;
pub mod reader;
pub mod sound;
pub mod source;

/// `use maplet_wz::prelude::*;` to import commonly used items.
pub mod prelude;

#[cfg(test)]
pub(crate) mod test_archive;

pub use canvas::Canvas;
pub use error::WzError;
pub use manager::ResourceManager;
pub use node::{Node, Value};
pub use sound::Sound;
pub use source::{FileSource, PackageSource, Source, SourceInfo, SourceOptions};
