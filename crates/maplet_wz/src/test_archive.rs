//! Minimal synthetic archive bytes for unit tests.
//!
//! The full-featured builder lives with the integration tests; unit
//! tests only need a structurally valid archive with an empty root.

use crate::source::file::{version_hash, version_key};

/// Header size up to and including the data-start field.
const HEADER_LEN: usize = 16;

/// Builds the smallest well-formed single-file archive: a header, an
/// encrypted version and an empty root directory.
pub(crate) fn minimal_archive() -> Vec<u8> {
	let copyright = b"test archive\0";
	let data_start = (HEADER_LEN + copyright.len() + 2) as u32;

	let mut out = Vec::new();
	out.extend_from_slice(b"PKG1");
	out.extend_from_slice(&0u64.to_le_bytes()); // patched below
	out.extend_from_slice(&data_start.to_le_bytes());
	out.extend_from_slice(copyright);
	out.extend_from_slice(&version_key(version_hash(95)).to_le_bytes());
	assert_eq!(out.len(), data_start as usize);

	// Empty root directory: compressed-int count of zero.
	out.push(0);

	let size = out.len() as u64;
	out[4..12].copy_from_slice(&size.to_le_bytes());
	out
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::source::{FileSource, SourceOptions};

	#[test]
	fn test_minimal_archive_opens() {
		let source =
			FileSource::open_bytes(minimal_archive(), "Test", SourceOptions::default()).unwrap();
		assert_eq!(source.root().child_count(), 0);
		assert_eq!(source.copyright(), "test archive");
	}
}
