//! Collab: collaboratively edited channel descriptions.
//!
//! `Collab` sits between a UI that only knows "the description is now this
//! string" and the sync layer that only knows operations. Local edits are
//! diffed into a single operation and applied optimistically; remote and
//! server-confirmed operations are applied back onto the channel text.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use concord_core::{apply, diff, validate_against, ClientId, DocumentId, Operation};
use concord_sync::{Dispatch, Dispatcher, SessionConfig, SessionRegistry, SyncMessage, SyncSession};
use tokio::sync::mpsc;

use crate::error::{CollabError, Result};

/// Configuration for Collab.
#[derive(Debug, Clone)]
pub struct CollabConfig {
    /// Configuration for every session opened.
    pub session: SessionConfig,
    /// Validate local edits and server operations against the channel text
    /// before applying them.
    pub validate_edits: bool,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            validate_edits: true,
        }
    }
}

/// What the UI shows for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDescription {
    /// Current local text, including unacknowledged local edits.
    pub text: String,
    /// Drives the "syncing…" indicator.
    pub is_syncing: bool,
    /// Every operation applied to `text`, local and remote, in order.
    pub applied: Vec<Operation>,
    /// Last transport failure, if any.
    pub last_error: Option<String>,
}

/// An open channel.
///
/// `gate` serializes calls into the channel's session: a local edit must be
/// applied to the text and queued as pending before a remote operation is
/// rebased, and the other way around. `state` is what callbacks touch, so it
/// is never held while the session runs.
struct Channel {
    gate: Mutex<()>,
    state: Mutex<ChannelDescription>,
}

impl Channel {
    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> MutexGuard<'_, ChannelDescription> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collaborative editing of channel descriptions for one client.
pub struct Collab {
    client_id: ClientId,
    config: CollabConfig,
    registry: Arc<SessionRegistry>,
    channels: RwLock<HashMap<DocumentId, Arc<Channel>>>,
    outbound: mpsc::UnboundedSender<SyncMessage>,
}

impl Collab {
    /// Create a Collab for `client_id`.
    ///
    /// Returns the receiver of everything the sessions want sent; drain it
    /// into a transport (see [`concord_sync::pump_outbound`]). Inbound
    /// traffic goes through the Collab itself: pass it, not its registry, to
    /// [`concord_sync::pump_inbound`].
    pub fn new(
        client_id: ClientId,
        config: CollabConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SyncMessage>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let collab = Self {
            client_id,
            config,
            registry: Arc::new(SessionRegistry::new()),
            channels: RwLock::new(HashMap::new()),
            outbound,
        };
        (collab, rx)
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// The registry, for wiring up [`concord_sync::pump_outbound`].
    ///
    /// Do not dispatch inbound messages through it directly: that bypasses
    /// the ordering between local edits and remote operations.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn session(&self, document_id: &DocumentId) -> Option<Arc<SyncSession>> {
        self.registry.get(document_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Channel lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start editing a channel whose current description is `initial_text`.
    pub fn open_channel(&self, document_id: DocumentId, initial_text: &str) -> Result<()> {
        let mut channels = self.channels_mut();
        if channels.contains_key(&document_id) {
            return Err(CollabError::ChannelExists(document_id));
        }

        let channel = Arc::new(Channel {
            gate: Mutex::new(()),
            state: Mutex::new(ChannelDescription {
                text: initial_text.to_owned(),
                ..Default::default()
            }),
        });

        let session = SyncSession::new(
            document_id.clone(),
            self.client_id,
            self.outbound.clone(),
            self.config.session.clone(),
        );
        let session = self.wire_callbacks(session, &channel);

        self.registry.register(Arc::new(session));
        channels.insert(document_id.clone(), channel);
        tracing::debug!(document = %document_id, "channel opened");
        Ok(())
    }

    /// Stop editing a channel. Messages still in flight for it are ignored.
    pub fn close_channel(&self, document_id: &DocumentId) -> Result<ChannelDescription> {
        let channel = self
            .channels_mut()
            .remove(document_id)
            .ok_or_else(|| CollabError::ChannelNotFound(document_id.clone()))?;
        self.registry.unregister(document_id);
        tracing::debug!(document = %document_id, "channel closed");

        let description = channel.state().clone();
        Ok(description)
    }

    pub fn channel_ids(&self) -> Vec<DocumentId> {
        self.channels().keys().cloned().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Editing
    // ─────────────────────────────────────────────────────────────────────────

    /// The user changed the description to `new_text`.
    ///
    /// Diffs against the last known text, applies the result locally and
    /// sends it. Returns `None` when nothing changed.
    pub fn edit_channel_description(
        &self,
        document_id: &DocumentId,
        new_text: &str,
    ) -> Result<Option<Operation>> {
        let channel = self.channel(document_id)?;
        let session = self.session_for(document_id)?;
        let _gate = channel.gate();

        let edit = {
            let mut state = channel.state();
            let Some(edit) = diff(&state.text, new_text) else {
                return Ok(None);
            };
            if self.config.validate_edits {
                validate_against(&state.text, &edit)?;
            }
            state.text = new_text.to_owned();
            edit
        };

        // The state lock is released: the session fires callbacks that take it.
        let op = session.send_local_operation(edit);
        channel.state().applied.push(op.clone());
        Ok(Some(op))
    }

    /// Apply an operation confirmed by the server onto the channel text.
    ///
    /// The operation must already be transformed against local state.
    pub fn apply_server_operation(&self, document_id: &DocumentId, op: &Operation) -> Result<()> {
        let channel = self.channel(document_id)?;
        let session = self.session_for(document_id)?;
        let _gate = channel.gate();
        let mut state = channel.state();

        if self.config.validate_edits {
            validate_against(&state.text, &op.edit)?;
        }
        state.text = apply(&state.text, op);
        state.applied.push(op.clone());
        // Local edits still waiting for their ack keep the channel syncing.
        state.is_syncing = !session.is_synced();
        Ok(())
    }

    /// Route an inbound wire message to its channel.
    pub fn handle_message(&self, raw: &str) -> Result<Dispatch> {
        match peek_document_id(raw).and_then(|id| self.channel(&id).ok()) {
            Some(channel) => {
                let _gate = channel.gate();
                Ok(self.registry.handle_message(raw)?)
            }
            None => Ok(self.registry.handle_message(raw)?),
        }
    }

    /// Ask for the authoritative description of a channel.
    pub fn request_full_sync(&self, document_id: &DocumentId) -> Result<()> {
        let session = self.session_for(document_id)?;
        session.request_full_sync();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub fn description(&self, document_id: &DocumentId) -> Result<String> {
        Ok(self.channel(document_id)?.state().text.clone())
    }

    pub fn is_syncing(&self, document_id: &DocumentId) -> Result<bool> {
        Ok(self.channel(document_id)?.state().is_syncing)
    }

    /// Full snapshot of a channel's state.
    pub fn channel_state(&self, document_id: &DocumentId) -> Result<ChannelDescription> {
        Ok(self.channel(document_id)?.state().clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    fn wire_callbacks(&self, session: SyncSession, channel: &Arc<Channel>) -> SyncSession {
        let validate = self.config.validate_edits;
        let document_id = session.document_id().clone();

        let on_remote = Arc::clone(channel);
        let on_sync = Arc::clone(channel);
        let on_error = Arc::clone(channel);
        let on_snapshot = Arc::clone(channel);
        let doc = document_id.clone();

        session
            .with_remote_operation_callback(move |op| {
                let mut state = on_remote.state();
                if validate {
                    if let Err(err) = validate_against(&state.text, &op.edit) {
                        tracing::warn!(document = %doc, error = %err, "remote operation does not fit local text");
                    }
                }
                state.text = apply(&state.text, op);
                state.applied.push(op.clone());
            })
            .with_sync_state_callback(move |synced| {
                on_sync.state().is_syncing = !synced;
            })
            .with_error_callback(move |err| {
                tracing::warn!(document = %document_id, error = %err, "channel sync error");
                on_error.state().last_error = Some(err.to_string());
            })
            .with_snapshot_callback(move |text| {
                let mut state = on_snapshot.state();
                state.text = text.to_owned();
                state.last_error = None;
            })
    }

    fn channel(&self, document_id: &DocumentId) -> Result<Arc<Channel>> {
        self.channels()
            .get(document_id)
            .cloned()
            .ok_or_else(|| CollabError::ChannelNotFound(document_id.clone()))
    }

    fn session_for(&self, document_id: &DocumentId) -> Result<Arc<SyncSession>> {
        self.registry
            .get(document_id)
            .ok_or_else(|| CollabError::ChannelNotFound(document_id.clone()))
    }

    fn channels(&self) -> std::sync::RwLockReadGuard<'_, HashMap<DocumentId, Arc<Channel>>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn channels_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<DocumentId, Arc<Channel>>> {
        self.channels.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatcher for Collab {
    /// Route a decoded message, serialized with edits on the same channel.
    fn dispatch(&self, message: SyncMessage) -> concord_sync::Result<Dispatch> {
        match self.channel(message.document_id()) {
            Ok(channel) => {
                let _gate = channel.gate();
                self.registry.dispatch(message)
            }
            Err(_) => self.registry.dispatch(message),
        }
    }
}

/// Read `documentId` without decoding the rest of the message.
fn peek_document_id(raw: &str) -> Option<DocumentId> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("documentId")
        .and_then(serde_json::Value::as_str)
        .map(DocumentId::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{Edit, ValidationError};
    use concord_sync::{MemoryNetwork, SyncError, Transport};
    use std::time::Duration;

    fn collab(client: u32) -> (Collab, mpsc::UnboundedReceiver<SyncMessage>) {
        Collab::new(ClientId(client), CollabConfig::default())
    }

    #[test]
    fn test_open_and_close() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");

        collab.open_channel(doc.clone(), "topic").unwrap();
        assert_eq!(collab.description(&doc).unwrap(), "topic");
        assert!(!collab.is_syncing(&doc).unwrap());
        assert!(matches!(
            collab.open_channel(doc.clone(), "again"),
            Err(CollabError::ChannelExists(_))
        ));

        let last = collab.close_channel(&doc).unwrap();
        assert_eq!(last.text, "topic");
        assert!(collab.session(&doc).is_none());
        assert!(matches!(
            collab.description(&doc),
            Err(CollabError::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_edit_produces_minimal_operation() {
        let (collab, mut rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "AC").unwrap();

        let op = collab.edit_channel_description(&doc, "ABC").unwrap().unwrap();
        assert_eq!(op.edit, Edit::insert(1, "B"));
        assert_eq!(op.timestamp(), 1);
        assert_eq!(collab.description(&doc).unwrap(), "ABC");
        assert!(collab.is_syncing(&doc).unwrap());

        assert_eq!(rx.try_recv().unwrap(), SyncMessage::operation(&doc, &op));
    }

    #[test]
    fn test_unchanged_text_is_not_sent() {
        let (collab, mut rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "same").unwrap();

        assert_eq!(collab.edit_channel_description(&doc, "same").unwrap(), None);
        assert!(rx.try_recv().is_err());
        assert!(!collab.is_syncing(&doc).unwrap());
    }

    #[test]
    fn test_apply_server_operation_validates() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "abc").unwrap();

        let bad = Operation::stamped(ClientId(2), 1, Edit::delete_len(2, 5));
        assert!(matches!(
            collab.apply_server_operation(&doc, &bad),
            Err(CollabError::Validation(_))
        ));
        assert_eq!(collab.description(&doc).unwrap(), "abc");

        let good = Operation::stamped(ClientId(2), 1, Edit::insert(3, "d"));
        collab.apply_server_operation(&doc, &good).unwrap();
        assert_eq!(collab.description(&doc).unwrap(), "abcd");
        assert_eq!(collab.channel_state(&doc).unwrap().applied, vec![good]);
    }

    #[test]
    fn test_unknown_channel() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("nope");
        assert!(matches!(
            collab.edit_channel_description(&doc, "x"),
            Err(CollabError::ChannelNotFound(_))
        ));
        assert!(matches!(
            collab.request_full_sync(&doc),
            Err(CollabError::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_closed_outbound_records_error() {
        let (collab, rx) = collab(1);
        drop(rx);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "").unwrap();

        collab.edit_channel_description(&doc, "hi").unwrap();
        let state = collab.channel_state(&doc).unwrap();
        assert_eq!(state.text, "hi");
        assert!(state.is_syncing);
        assert!(state.last_error.is_some());
    }

    #[test]
    fn test_server_operation_keeps_syncing_while_pending() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "ab").unwrap();

        let local = collab.edit_channel_description(&doc, "abc").unwrap().unwrap();
        let server = Operation::stamped(ClientId(2), 1, Edit::insert(0, ">"));
        collab.apply_server_operation(&doc, &server).unwrap();

        assert_eq!(collab.description(&doc).unwrap(), ">abc");
        assert!(collab.is_syncing(&doc).unwrap());

        let session = collab.session(&doc).unwrap();
        session.acknowledge_local_operation(local.timestamp());
        let later = Operation::stamped(ClientId(2), 2, Edit::insert(4, "<"));
        collab.apply_server_operation(&doc, &later).unwrap();
        assert!(!collab.is_syncing(&doc).unwrap());
    }

    #[test]
    fn test_overflowing_ranges_are_rejected() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "HELLO").unwrap();
        collab.edit_channel_description(&doc, "HELLO!").unwrap();

        let raw = r#"{"type":"operation","documentId":"chan-1","operation":{"type":"delete","position":1,"length":18446744073709551615,"clientId":2,"timestamp":1}}"#;
        assert!(matches!(
            collab.handle_message(raw),
            Err(CollabError::Sync(SyncError::InvalidMessage(_)))
        ));

        let huge = Operation::stamped(ClientId(2), 1, Edit::delete_len(1, usize::MAX));
        assert!(matches!(
            collab.apply_server_operation(&doc, &huge),
            Err(CollabError::Validation(ValidationError::RangeOutOfBounds { .. }))
        ));
        assert_eq!(collab.description(&doc).unwrap(), "HELLO!");
        assert_eq!(collab.session(&doc).unwrap().pending_count(), 1);
    }

    #[test]
    fn test_misfit_remote_operation_still_applies() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "abc").unwrap();

        // Claims to replace "xy", but the text starts with "ab".
        let remote = Operation::stamped(ClientId(2), 1, Edit::modify(0, "xy", "Q"));
        let raw = SyncMessage::operation(&doc, &remote).to_json().unwrap();

        assert_eq!(collab.handle_message(&raw).unwrap(), Dispatch::Applied(remote.clone()));
        let state = collab.channel_state(&doc).unwrap();
        assert_eq!(state.text, "Qc");
        assert_eq!(state.applied, vec![remote]);
    }

    #[test]
    fn test_dispatch_waits_for_channel_gate() {
        let (collab, _rx) = collab(1);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "AC").unwrap();

        let channel = collab.channel(&doc).unwrap();
        let remote = Operation::stamped(ClientId(2), 1, Edit::insert(1, "X"));
        let message = SyncMessage::operation(&doc, &remote);

        std::thread::scope(|scope| {
            // Stands in for a local edit in progress.
            let gate = channel.gate();
            let inbound = scope.spawn(|| Dispatcher::dispatch(&collab, message));

            std::thread::sleep(Duration::from_millis(50));
            assert!(!inbound.is_finished());
            assert_eq!(collab.description(&doc).unwrap(), "AC");
            assert!(collab.session(&doc).unwrap().history().is_empty());

            drop(gate);
            let dispatch = inbound.join().unwrap().unwrap();
            assert_eq!(dispatch, Dispatch::Applied(remote.clone()));
        });

        assert_eq!(collab.description(&doc).unwrap(), "AXC");
    }

    #[tokio::test]
    async fn test_inbound_pump_through_collab() {
        let network = MemoryNetwork::new();
        let server = network.create_transport(ClientId(0)).await;
        let transport = Arc::new(network.create_transport(ClientId(1)).await);

        let (collab, _rx) = collab(1);
        let collab = Arc::new(collab);
        let doc = DocumentId::new("chan-1");
        collab.open_channel(doc.clone(), "AC").unwrap();
        let local = collab.edit_channel_description(&doc, "ABC").unwrap().unwrap();

        let remote = Operation::stamped(ClientId(2), 1, Edit::insert(1, "X"));
        server.send(&ClientId(1), SyncMessage::operation(&doc, &remote)).await.unwrap();
        server
            .send(
                &ClientId(1),
                SyncMessage::Ack {
                    document_id: doc.clone(),
                    timestamp: local.timestamp(),
                },
            )
            .await
            .unwrap();

        let report = concord_sync::pump_inbound(
            transport,
            Arc::clone(&collab),
            Duration::from_millis(20),
        )
        .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(collab.description(&doc).unwrap(), "ABXC");
        assert!(!collab.is_syncing(&doc).unwrap());
    }
}
