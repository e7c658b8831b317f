//! Session registry and inbound message router.
//!
//! The registry maps a document to its session and routes inbound messages
//! to it. Its lock is independent of every session's lock and is never held
//! while a session runs.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use concord_core::{DocumentId, Operation, Timestamp};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;
use crate::session::SyncSession;

/// What the router did with an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A remote operation was rebased; this is what the document should apply.
    Applied(Operation),
    /// Our own operation came back; nothing to do.
    Echo,
    /// An acknowledgment was processed. `known` is false for an unknown or
    /// duplicate timestamp.
    Acknowledged { timestamp: Timestamp, known: bool },
    /// A full sync completed.
    Snapshot,
    /// Unknown type, or no session for the document.
    Ignored,
}

/// Something that routes decoded inbound messages to sessions.
///
/// [`SessionRegistry`] is the plain router. Owners that must serialize
/// inbound traffic with their own edits implement this around it, and hand
/// themselves to [`crate::pump_inbound`].
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, message: SyncMessage) -> Result<Dispatch>;
}

/// Registry of live sessions, keyed by document.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<DocumentId, Arc<SyncSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session under its document id.
    ///
    /// Returns the session it replaced, if any.
    pub fn register(&self, session: Arc<SyncSession>) -> Option<Arc<SyncSession>> {
        let document_id = session.document_id().clone();
        tracing::debug!(document = %document_id, "session registered");
        self.write().insert(document_id, session)
    }

    /// Remove the session for `document_id`.
    pub fn unregister(&self, document_id: &DocumentId) -> Option<Arc<SyncSession>> {
        let removed = self.write().remove(document_id);
        if removed.is_some() {
            tracing::debug!(document = %document_id, "session unregistered");
        }
        removed
    }

    pub fn get(&self, document_id: &DocumentId) -> Option<Arc<SyncSession>> {
        self.read().get(document_id).cloned()
    }

    pub fn contains(&self, document_id: &DocumentId) -> bool {
        self.read().contains_key(document_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.read().keys().cloned().collect()
    }

    /// Parse a raw JSON message and route it.
    ///
    /// Only `type` and `documentId` are read up front, so a message of an
    /// unknown type, or for a document with no session, is ignored without
    /// decoding the rest. Anything that is not JSON, or a known message
    /// missing its fields, is an [`SyncError::InvalidMessage`].
    pub fn handle_message(&self, raw: &str) -> Result<Dispatch> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| SyncError::InvalidMessage(format!("malformed JSON: {e}")))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::InvalidMessage("missing type".into()))?;
        if !matches!(kind, "operation" | "ack" | "snapshot") {
            tracing::debug!(kind, "ignoring message type");
            return Ok(Dispatch::Ignored);
        }

        let document_id = value
            .get("documentId")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::InvalidMessage("missing documentId".into()))?;
        if !self.contains(&DocumentId::new(document_id)) {
            tracing::debug!(document = document_id, "no session for document");
            return Ok(Dispatch::Ignored);
        }

        let message: SyncMessage = serde_json::from_value(value).map_err(|e| {
            tracing::warn!(error = %e, "undecodable message");
            SyncError::InvalidMessage(e.to_string())
        })?;
        self.dispatch(message)
    }

    /// Route an already decoded message.
    pub fn dispatch(&self, message: SyncMessage) -> Result<Dispatch> {
        // Clone the Arc out so the registry lock is released before the
        // session takes its own.
        let Some(session) = self.get(message.document_id()) else {
            return Ok(Dispatch::Ignored);
        };

        let dispatch = match message {
            SyncMessage::Operation { operation, .. } => {
                let op = Operation::try_from(operation)?;
                match session.handle_remote_operation(op) {
                    Some(applied) => Dispatch::Applied(applied),
                    None => Dispatch::Echo,
                }
            }
            SyncMessage::Ack { timestamp, .. } => Dispatch::Acknowledged {
                timestamp,
                known: session.acknowledge_local_operation(timestamp),
            },
            SyncMessage::Snapshot { text, .. } => {
                session.complete_full_sync(&text);
                Dispatch::Snapshot
            }
            SyncMessage::SyncRequest { .. } => Dispatch::Ignored,
        };
        Ok(dispatch)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<DocumentId, Arc<SyncSession>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DocumentId, Arc<SyncSession>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatcher for SessionRegistry {
    fn dispatch(&self, message: SyncMessage) -> Result<Dispatch> {
        SessionRegistry::dispatch(self, message)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("documents", &self.document_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use concord_core::{ClientId, Edit};
    use tokio::sync::mpsc;

    fn registry_with(doc: &str, client: u32) -> (SessionRegistry, Arc<SyncSession>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new(SyncSession::new(
            DocumentId::new(doc),
            ClientId(client),
            tx,
            SessionConfig::default(),
        ));
        let registry = SessionRegistry::new();
        registry.register(Arc::clone(&session));
        (registry, session)
    }

    #[test]
    fn test_register_unregister() {
        let (registry, session) = registry_with("chan-1", 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(session.document_id()));

        assert!(registry.unregister(session.document_id()).is_some());
        assert!(registry.is_empty());
        assert!(registry.unregister(session.document_id()).is_none());
    }

    #[test]
    fn test_routes_operation() {
        let (registry, session) = registry_with("chan-1", 1);
        let raw = r#"{"type":"operation","documentId":"chan-1",
            "operation":{"type":"insert","position":0,"content":"hi","clientId":2,"timestamp":1}}"#;

        let dispatch = registry.handle_message(raw).unwrap();
        let Dispatch::Applied(op) = dispatch else {
            panic!("expected applied, got {dispatch:?}");
        };
        assert_eq!(op.edit, Edit::insert(0, "hi"));
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_routes_ack() {
        let (registry, session) = registry_with("chan-1", 1);
        let op = session.send_local_operation(Edit::insert(0, "a"));

        let raw = format!(
            r#"{{"type":"ack","documentId":"chan-1","timestamp":{}}}"#,
            op.timestamp()
        );
        assert_eq!(
            registry.handle_message(&raw).unwrap(),
            Dispatch::Acknowledged {
                timestamp: 1,
                known: true
            }
        );
        assert!(session.is_synced());
    }

    #[test]
    fn test_unknown_type_and_document_ignored() {
        let (registry, _session) = registry_with("chan-1", 1);

        let presence = r#"{"type":"presence","documentId":"chan-1","user":"x"}"#;
        assert_eq!(registry.handle_message(presence).unwrap(), Dispatch::Ignored);

        let closed = r#"{"type":"operation","documentId":"gone",
            "operation":{"type":"insert","position":0,"content":"x","clientId":2,"timestamp":1}}"#;
        assert_eq!(registry.handle_message(closed).unwrap(), Dispatch::Ignored);
    }

    #[test]
    fn test_malformed_messages_rejected() {
        let (registry, _session) = registry_with("chan-1", 1);

        let err = registry.handle_message("not json").unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));

        let missing = r#"{"type":"operation","documentId":"chan-1",
            "operation":{"type":"insert","position":0,"clientId":2,"timestamp":1}}"#;
        let err = registry.handle_message(missing).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMessage(_)));
    }

    #[test]
    fn test_echo_dispatch() {
        let (registry, session) = registry_with("chan-1", 1);
        let op = session.send_local_operation(Edit::insert(0, "a"));
        let message = SyncMessage::operation(session.document_id(), &op);
        assert_eq!(registry.dispatch(message).unwrap(), Dispatch::Echo);
    }
}
