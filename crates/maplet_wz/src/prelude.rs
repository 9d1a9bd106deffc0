//! Prelude module for `maplet_wz`.
//!
//! # Examples
//!
//! ```no_run
//! use maplet_wz::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = Source::open("Character.wz", "Character", SourceOptions::default())?;
//! let body = source.root().descend("00002000.img");
//! # Ok(())
//! # }
//! ```

#[doc(inline)]
pub use crate::{
	// Canvas types
	Canvas,

	// Archive sources
	FileSource,
	// Node tree
	Node,
	PackageSource,
	// Manager
	ResourceManager,
	Sound,
	Source,
	SourceInfo,
	SourceOptions,
	Value,

	// Errors
	WzError,
};

#[doc(inline)]
pub use crate::crypto::Keystream;

#[doc(inline)]
pub use crate::reader::Reader;

// Re-export the crate for advanced usage
#[doc(inline)]
pub use crate as wz;
