//! Error types for Concord.

use concord_core::{DocumentId, ValidationError};
use concord_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during collaborative editing.
#[derive(Debug, Error)]
pub enum CollabError {
    /// An edit or server operation does not fit the channel text.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// No open channel with this id.
    #[error("channel not found: {0}")]
    ChannelNotFound(DocumentId),

    /// The channel is already open.
    #[error("channel already open: {0}")]
    ChannelExists(DocumentId),
}

/// Result type for Concord operations.
pub type Result<T> = std::result::Result<T, CollabError>;
