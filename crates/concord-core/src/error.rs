//! Error types for Concord Core.

use thiserror::Error;

/// An edit does not fit the text it is about to be applied to.
///
/// The transform engine never produces these; they are raised at the edge,
/// before a malformed edit can reach the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("position {position} out of bounds for text of length {len}")]
    PositionOutOfBounds { position: usize, len: usize },

    #[error("range {position}..{end} out of bounds for text of length {len}")]
    RangeOutOfBounds {
        position: usize,
        end: usize,
        len: usize,
    },

    #[error("modify at {position} expected {expected:?}, found {found:?}")]
    ContentMismatch {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("delete at {position} claims to remove {claimed:?}, text has {found:?}")]
    RemovedMismatch {
        position: usize,
        claimed: String,
        found: String,
    },
}

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;
