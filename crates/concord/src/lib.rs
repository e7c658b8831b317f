//! # Concord
//!
//! The unified API for Concord: real-time collaborative editing of short
//! shared texts such as a channel description.
//!
//! ## Overview
//!
//! - **Operations**: Insert, delete and modify edits stamped with their origin
//! - **Transform**: Concurrent operations are rebased so every client converges
//! - **Sessions**: Per-document pending queue, history and sync state
//! - **Collab**: Turns "the text is now X" into operations and back
//!
//! ## Usage
//!
//! ```rust
//! use concord::{ClientId, Collab, CollabConfig, DocumentId};
//!
//! let (collab, mut outbound) = Collab::new(ClientId(1), CollabConfig::default());
//! let channel = DocumentId::new("general");
//!
//! collab.open_channel(channel.clone(), "Welcome").unwrap();
//! let op = collab
//!     .edit_channel_description(&channel, "Welcome all")
//!     .unwrap()
//!     .unwrap();
//!
//! assert_eq!(collab.description(&channel).unwrap(), "Welcome all");
//! assert!(collab.is_syncing(&channel).unwrap());
//!
//! // The operation is queued for the transport.
//! let message = outbound.try_recv().unwrap();
//! assert_eq!(message.document_id(), &channel);
//!
//! // The server acknowledges it.
//! let ack = format!(
//!     r#"{{"type":"ack","documentId":"general","timestamp":{}}}"#,
//!     op.timestamp()
//! );
//! collab.handle_message(&ack).unwrap();
//! assert!(!collab.is_syncing(&channel).unwrap());
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `concord::core` - Operations, transform engine, diff and validation
//! - `concord::sync` - Sessions, registry, messages and transport

pub mod collab;
pub mod error;

// Re-export component crates
pub use concord_core as core;
pub use concord_sync as sync;

// Re-export main types for convenience
pub use collab::{ChannelDescription, Collab, CollabConfig};
pub use error::{CollabError, Result};

// Re-export commonly used types
pub use concord_core::{apply, diff, transform, ClientId, DocumentId, Edit, Operation};
pub use concord_sync::{Dispatch, Dispatcher, SessionConfig, SyncMessage, SyncSession};
