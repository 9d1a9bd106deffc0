//! Error types for the animation pipeline.

use thiserror::Error;

/// Errors surfaced by the animation pipeline's loaders.
///
/// The composition hot path never returns errors: missing items, missing
/// actions and broken links degrade to omitted layers, as the renderer
/// expects. These variants cover the load-time edges where a caller can
/// meaningfully react.
#[derive(Debug, Error)]
pub enum AvatarError {
	/// An item image lacks the requested action and the action is not in
	/// the development allowlist
	#[error("item {item} has no action '{action}'")]
	ActionMissingOnItem {
		/// Item id whose image was consulted
		item: i32,
		/// Requested action name
		action: String,
	},

	/// An action code outside the dense table range
	#[error("action code {0} out of range")]
	BadActionCode(u16),

	/// The body image required for the action table could not be read
	#[error("action table source image is missing or empty")]
	MissingActionSource,
}
