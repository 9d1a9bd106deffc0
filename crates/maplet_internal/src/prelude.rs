//! Prelude module for `maplet_internal`.
//!
//! # Examples
//!
//! ```no_run
//! use maplet_internal::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rm = ResourceManager::initialize("data", SourceOptions::default())?;
//! let table = ActionTable::load(&rm)?;
//! let mut avatar = Avatar::new(Appearance::default());
//! avatar.update(&table, 0);
//! # Ok(())
//! # }
//! ```

// Re-export everything from the subsystem preludes
#[doc(inline)]
pub use maplet_avatar::prelude::*;

#[doc(inline)]
pub use maplet_wz::prelude::*;

// Re-export the subsystem crates for advanced usage
#[doc(inline)]
pub use maplet_avatar;

#[doc(inline)]
pub use maplet_wz;
