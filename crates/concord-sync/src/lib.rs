//! # Concord Sync
//!
//! Client-side synchronization of collaboratively edited text.
//!
//! ## Overview
//!
//! Each document a client edits has a [`SyncSession`]. The session stamps
//! local edits, keeps them pending until the server acknowledges them, and
//! rebases incoming remote operations past whatever is still pending. A
//! [`SessionRegistry`] routes inbound messages to the right session.
//!
//! ## Message Flow
//!
//! ```text
//! Client A                 Server                 Client B
//!   |--- operation (ts=1) --->|                       |
//!   |                         |--- operation (A,1) -->|
//!   |<-------- ack (1) -------|                       |
//!   |                         |                       |
//!   |--- syncRequest -------->|                       |
//!   |<------- snapshot -------|                       |
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use concord_core::{ClientId, DocumentId, Edit};
//! use concord_sync::{SessionConfig, SessionRegistry, SyncSession};
//!
//! let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
//! let session = Arc::new(SyncSession::new(
//!     DocumentId::new("chan-1"),
//!     ClientId(1),
//!     tx,
//!     SessionConfig::default(),
//! ));
//! let registry = SessionRegistry::new();
//! registry.register(Arc::clone(&session));
//!
//! let op = session.send_local_operation(Edit::insert(0, "hi"));
//! assert!(!session.is_synced());
//!
//! let ack = format!(r#"{{"type":"ack","documentId":"chan-1","timestamp":{}}}"#, op.timestamp());
//! registry.handle_message(&ack).unwrap();
//! assert!(session.is_synced());
//! ```

pub mod error;
pub mod messages;
pub mod pump;
pub mod registry;
pub mod session;
pub mod transport;

pub use error::{Result, SyncError};
pub use messages::{SyncMessage, WireOperation};
pub use pump::{pump_inbound, pump_outbound, PumpReport};
pub use registry::{Dispatch, Dispatcher, SessionRegistry};
pub use session::{Outbox, SessionConfig, SyncSession};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Transport};
