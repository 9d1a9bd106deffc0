#![allow(clippy::single_component_path_imports)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! `maplet-rs` is a project that aims to revive the client core of an old
//! 2D side-scrolling online RPG and bring it to modern platforms using
//! Rust: the packaged asset store and the character animation pipeline.
//!
pub use maplet_internal::*;
