//! Error types for archive parsing and queries.

use thiserror::Error;

/// Errors that can occur when opening or parsing a packaged archive.
///
/// Per-node faults (missing children, unresolvable links, undecodable
/// canvases) are deliberately *not* represented here; those surface as
/// `Option`/default returns on the query path so the hot path never
/// propagates errors. Only whole-archive faults reach this type.
#[derive(Debug, Error)]
pub enum WzError {
	/// Magic, signature or structural violation at open time
	#[error("Malformed archive: {0}")]
	MalformedArchive(String),

	/// The version-hash probe exhausted every candidate
	#[error("Cannot determine archive version (probe exhausted at {probed} candidates)")]
	BadVersion {
		/// Number of candidate versions tried
		probed: u32,
	},

	/// A package shard listed by the index is missing on disk.
	///
	/// Non-fatal at the package level; the opener logs and skips the shard.
	#[error("Missing shard file: {path}")]
	MissingShard {
		/// Path of the missing shard
		path: String,
	},

	/// Read past the end of the mapped file
	#[error("Truncated read at offset {offset}: wanted {wanted} bytes, {available} available")]
	Truncated {
		/// Offset of the attempted read
		offset: usize,
		/// Number of bytes requested
		wanted: usize,
		/// Number of bytes remaining
		available: usize,
	},

	/// An image subtree failed structural validation
	#[error("Bad image data: {0}")]
	BadImage(String),

	/// IO error
	#[error(transparent)]
	IOError(#[from] std::io::Error),
}
