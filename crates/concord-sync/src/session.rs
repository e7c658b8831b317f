//! Per-document client synchronization session.
//!
//! A session owns the pending queue (sent, not yet acknowledged), the
//! history of everything applied, and the local logical clock. It moves
//! between two states:
//!
//! ```text
//!            send_local_operation / request_full_sync
//!   Synced  ------------------------------------------>  OutOfSync
//!           <------------------------------------------
//!            last ack / complete_full_sync
//! ```
//!
//! All state sits behind one mutex. Callbacks run after the lock is released,
//! so a callback may call back into the session.

use std::sync::{Mutex, MutexGuard, PoisonError};

use concord_core::{transform, ClientId, DocumentId, Edit, Operation, Timestamp};
use tokio::sync::mpsc;

use crate::error::{Result, SyncError};
use crate::messages::SyncMessage;

/// Where a session hands outbound messages.
///
/// The session's job ends at enqueueing; delivery, retry and backoff belong
/// to whoever drains the sink.
pub trait Outbox: Send + Sync {
    fn submit(&self, message: SyncMessage) -> Result<()>;
}

impl Outbox for mpsc::UnboundedSender<SyncMessage> {
    fn submit(&self, message: SyncMessage) -> Result<()> {
        self.send(message)
            .map_err(|_| SyncError::TransportError("outbound queue closed".into()))
    }
}

/// Configuration for session behavior.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Mark the session synced after every remote operation, even with local
    /// operations still pending. Off by default: synced means nothing pending.
    pub remote_resets_sync: bool,
}

type RemoteOperationCallback = Box<dyn Fn(&Operation) + Send + Sync>;
type SyncStateCallback = Box<dyn Fn(bool) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(&SyncError) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_remote_operation: Option<RemoteOperationCallback>,
    on_sync_state_changed: Option<SyncStateCallback>,
    on_error: Option<ErrorCallback>,
    on_snapshot: Option<SnapshotCallback>,
}

struct SessionState {
    pending: Vec<Operation>,
    history: Vec<Operation>,
    operation_counter: Timestamp,
    synced: bool,
}

impl SessionState {
    /// Returns the new value if the flag changed.
    fn set_synced(&mut self, synced: bool) -> Option<bool> {
        if self.synced == synced {
            return None;
        }
        self.synced = synced;
        Some(synced)
    }
}

/// Synchronization session for one document.
pub struct SyncSession {
    document_id: DocumentId,
    client_id: ClientId,
    config: SessionConfig,
    outbox: Box<dyn Outbox>,
    callbacks: Callbacks,
    state: Mutex<SessionState>,
}

impl SyncSession {
    /// Create a session in the `Synced` state.
    pub fn new(
        document_id: DocumentId,
        client_id: ClientId,
        outbox: impl Outbox + 'static,
        config: SessionConfig,
    ) -> Self {
        Self {
            document_id,
            client_id,
            config,
            outbox: Box::new(outbox),
            callbacks: Callbacks::default(),
            state: Mutex::new(SessionState {
                pending: Vec::new(),
                history: Vec::new(),
                operation_counter: 0,
                synced: true,
            }),
        }
    }

    /// Called with every remote operation after it has been rebased.
    pub fn with_remote_operation_callback(
        mut self,
        f: impl Fn(&Operation) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.on_remote_operation = Some(Box::new(f));
        self
    }

    /// Called with the new flag whenever the synced state flips.
    pub fn with_sync_state_callback(mut self, f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.callbacks.on_sync_state_changed = Some(Box::new(f));
        self
    }

    /// Called on transport failures.
    pub fn with_error_callback(mut self, f: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    /// Called with the authoritative text when a full sync completes.
    pub fn with_snapshot_callback(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_snapshot = Some(Box::new(f));
        self
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stamp a local edit, queue it as pending and hand it to the outbox.
    ///
    /// The caller has already applied the edit to its own text. A failing
    /// outbox is reported through the error callback; the operation stays
    /// pending either way.
    pub fn send_local_operation(&self, edit: Edit) -> Operation {
        let (op, changed) = {
            let mut state = self.lock();
            state.operation_counter += 1;
            let op = Operation::stamped(self.client_id, state.operation_counter, edit);
            state.pending.push(op.clone());
            state.history.push(op.clone());
            (op, state.set_synced(false))
        };

        tracing::debug!(
            document = %self.document_id,
            timestamp = op.timestamp(),
            kind = op.kind().as_str(),
            "local operation queued"
        );
        self.notify_sync_state(changed);
        self.submit(SyncMessage::operation(&self.document_id, &op));
        op
    }

    /// Rebase a remote operation past every pending local operation.
    ///
    /// Pending operations are rebased past the remote one in turn, oldest
    /// first, so the queue stays valid on top of the new text. Returns the
    /// operation to apply locally, or `None` for an echo of our own.
    pub fn handle_remote_operation(&self, op: Operation) -> Option<Operation> {
        if op.client_id() == self.client_id {
            tracing::debug!(
                document = %self.document_id,
                timestamp = op.timestamp(),
                "ignoring echo of local operation"
            );
            return None;
        }

        let (incoming, changed) = {
            let mut state = self.lock();
            let mut incoming = op;
            for local in state.pending.iter_mut() {
                let (local_rebased, incoming_rebased) = transform(local, &incoming);
                *local = local_rebased;
                incoming = incoming_rebased;
            }
            state.history.push(incoming.clone());
            let synced = self.config.remote_resets_sync || state.pending.is_empty();
            (incoming, state.set_synced(synced))
        };

        tracing::debug!(
            document = %self.document_id,
            from = %incoming.client_id(),
            timestamp = incoming.timestamp(),
            "remote operation rebased"
        );
        if let Some(f) = &self.callbacks.on_remote_operation {
            f(&incoming);
        }
        self.notify_sync_state(changed);
        Some(incoming)
    }

    /// Drop the pending operation with `timestamp`.
    ///
    /// Unknown and duplicate timestamps are ignored and return `false`.
    pub fn acknowledge_local_operation(&self, timestamp: Timestamp) -> bool {
        let (found, changed) = {
            let mut state = self.lock();
            match state.pending.iter().position(|op| op.timestamp() == timestamp) {
                Some(index) => {
                    state.pending.remove(index);
                    let synced = state.pending.is_empty();
                    (true, state.set_synced(synced))
                }
                None => (false, None),
            }
        };

        if found {
            tracing::debug!(document = %self.document_id, timestamp, "operation acknowledged");
        } else {
            tracing::debug!(document = %self.document_id, timestamp, "ack for unknown timestamp");
        }
        self.notify_sync_state(changed);
        found
    }

    /// Go out of sync and ask for the authoritative document.
    pub fn request_full_sync(&self) {
        let changed = self.lock().set_synced(false);
        tracing::debug!(document = %self.document_id, "full sync requested");
        self.notify_sync_state(changed);
        self.submit(SyncMessage::SyncRequest {
            document_id: self.document_id.clone(),
        });
    }

    /// Finish a full sync: the pending queue is superseded by `text`.
    pub fn complete_full_sync(&self, text: &str) {
        let (dropped, changed) = {
            let mut state = self.lock();
            let dropped = state.pending.len();
            state.pending.clear();
            (dropped, state.set_synced(true))
        };

        tracing::debug!(document = %self.document_id, dropped, "full sync completed");
        if let Some(f) = &self.callbacks.on_snapshot {
            f(text);
        }
        self.notify_sync_state(changed);
    }

    /// Re-submit every pending operation, oldest first.
    ///
    /// Stops at the first failure. Returns how many were handed over.
    pub fn retry_pending(&self) -> usize {
        let pending = self.pending_operations();
        for (sent, op) in pending.iter().enumerate() {
            let message = SyncMessage::operation(&self.document_id, op);
            if let Err(err) = self.outbox.submit(message) {
                self.report_transport_error(&err);
                return sent;
            }
        }
        pending.len()
    }

    /// Surface a delivery failure. Pending and history are left as they are.
    pub fn report_transport_error(&self, err: &SyncError) {
        tracing::warn!(document = %self.document_id, error = %err, "transport failure");
        if let Some(f) = &self.callbacks.on_error {
            f(err);
        }
    }

    pub fn is_synced(&self) -> bool {
        self.lock().synced
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Snapshot of the pending queue, oldest first.
    pub fn pending_operations(&self) -> Vec<Operation> {
        self.lock().pending.clone()
    }

    /// Snapshot of every operation applied so far.
    pub fn history(&self) -> Vec<Operation> {
        self.lock().history.clone()
    }

    /// Value of the local logical clock.
    pub fn operation_count(&self) -> Timestamp {
        self.lock().operation_counter
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submit(&self, message: SyncMessage) {
        if let Err(err) = self.outbox.submit(message) {
            self.report_transport_error(&err);
        }
    }

    fn notify_sync_state(&self, changed: Option<bool>) {
        if let (Some(synced), Some(f)) = (changed, &self.callbacks.on_sync_state_changed) {
            f(synced);
        }
    }
}

impl std::fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSession")
            .field("document_id", &self.document_id)
            .field("client_id", &self.client_id)
            .field("pending", &self.pending_count())
            .field("synced", &self.is_synced())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::apply;
    use std::sync::Arc;

    fn session(client: u32) -> (SyncSession, mpsc::UnboundedReceiver<SyncMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = SyncSession::new(
            DocumentId::new("chan-1"),
            ClientId(client),
            tx,
            SessionConfig::default(),
        );
        (session, rx)
    }

    fn remote(client: u32, timestamp: Timestamp, edit: Edit) -> Operation {
        Operation::stamped(ClientId(client), timestamp, edit)
    }

    #[test]
    fn test_local_operation_is_stamped_and_sent() {
        let (session, mut rx) = session(1);
        assert!(session.is_synced());

        let op = session.send_local_operation(Edit::insert(0, "a"));
        assert_eq!(op.timestamp(), 1);
        assert_eq!(op.client_id(), ClientId(1));
        assert!(!session.is_synced());
        assert_eq!(session.pending_count(), 1);
        assert_eq!(session.history(), vec![op.clone()]);

        let sent = rx.try_recv().unwrap();
        assert_eq!(sent, SyncMessage::operation(session.document_id(), &op));

        let op2 = session.send_local_operation(Edit::insert(1, "b"));
        assert_eq!(op2.timestamp(), 2);
        assert_eq!(session.operation_count(), 2);
    }

    #[test]
    fn test_sequential_acks_restore_sync() {
        let (session, _rx) = session(1);
        let first = session.send_local_operation(Edit::insert(0, "a"));
        let second = session.send_local_operation(Edit::insert(1, "b"));

        assert!(session.acknowledge_local_operation(first.timestamp()));
        assert!(!session.is_synced());
        assert!(session.acknowledge_local_operation(second.timestamp()));
        assert!(session.is_synced());
        assert_eq!(session.pending_count(), 0);
    }

    #[test]
    fn test_unknown_and_duplicate_acks_are_ignored() {
        let (session, _rx) = session(1);
        let op = session.send_local_operation(Edit::insert(0, "a"));

        assert!(!session.acknowledge_local_operation(99));
        assert_eq!(session.pending_count(), 1);

        assert!(session.acknowledge_local_operation(op.timestamp()));
        assert!(!session.acknowledge_local_operation(op.timestamp()));
        assert!(session.is_synced());
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_remote_rebased_past_pending() {
        // "HELLO": we deleted "ELL", a peer inserted "Z" at 2.
        let (session, _rx) = session(1);
        session.send_local_operation(Edit::delete(1, "ELL"));

        let rebased = session
            .handle_remote_operation(remote(2, 1, Edit::insert(2, "Z")))
            .unwrap();
        assert_eq!(rebased.edit, Edit::insert(1, "Z"));
        assert_eq!(apply("HO", &rebased), "HZO");

        // Still waiting on our own delete.
        assert!(!session.is_synced());
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_pending_queue_is_rebased() {
        let (session, _rx) = session(1);
        session.send_local_operation(Edit::insert(2, "x"));

        session.handle_remote_operation(remote(2, 1, Edit::insert(0, "abc")));
        let pending = session.pending_operations();
        assert_eq!(pending[0].edit, Edit::insert(5, "x"));
        assert_eq!(pending[0].timestamp(), 1);
    }

    #[test]
    fn test_remote_rebased_through_two_pending_in_order() {
        let (session, _rx) = session(1);
        let base = "hello";
        let l1 = session.send_local_operation(Edit::delete(1, "ell"));
        let l2 = session.send_local_operation(Edit::insert(1, "EY"));
        let local_text = apply(&apply(base, &l1), &l2);
        assert_eq!(local_text, "hEYo");

        let r = remote(2, 1, Edit::insert(4, "!"));
        let (l1_rebased, after_l1) = transform(&l1, &r);
        let (l2_rebased, expected) = transform(&l2, &after_l1);

        let applied = session.handle_remote_operation(r).unwrap();
        assert_eq!(applied, expected);
        assert_eq!(applied.edit, Edit::insert(3, "!"));
        assert_eq!(session.pending_operations(), vec![l1_rebased, l2_rebased]);
        assert_eq!(apply(&local_text, &applied), "hEY!o");
    }

    #[test]
    fn test_remote_with_nothing_pending_keeps_sync() {
        let (session, _rx) = session(1);
        let op = remote(2, 4, Edit::insert(0, "hi"));
        assert_eq!(session.handle_remote_operation(op.clone()), Some(op));
        assert!(session.is_synced());
    }

    #[test]
    fn test_echo_is_ignored() {
        let (session, _rx) = session(1);
        let local = session.send_local_operation(Edit::insert(0, "a"));
        assert_eq!(session.handle_remote_operation(local), None);
        assert_eq!(session.history().len(), 1);
    }

    #[test]
    fn test_remote_resets_sync_when_configured() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = SyncSession::new(
            DocumentId::new("d"),
            ClientId(1),
            tx,
            SessionConfig {
                remote_resets_sync: true,
            },
        );
        session.send_local_operation(Edit::insert(0, "a"));
        session.handle_remote_operation(remote(2, 1, Edit::insert(0, "b")));
        assert!(session.is_synced());
        assert_eq!(session.pending_count(), 1);
    }

    #[test]
    fn test_sync_state_callback_fires_on_change_only() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = SyncSession::new(DocumentId::new("d"), ClientId(1), tx, SessionConfig::default())
            .with_sync_state_callback(move |synced| sink.lock().unwrap().push(synced));

        let a = session.send_local_operation(Edit::insert(0, "a"));
        let b = session.send_local_operation(Edit::insert(1, "b"));
        session.acknowledge_local_operation(a.timestamp());
        session.acknowledge_local_operation(b.timestamp());
        session.acknowledge_local_operation(b.timestamp());

        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn test_remote_callback_may_reenter_session() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Arc::new_cyclic(|weak: &std::sync::Weak<SyncSession>| {
            let weak = weak.clone();
            SyncSession::new(DocumentId::new("d"), ClientId(1), tx, SessionConfig::default())
                .with_remote_operation_callback(move |_| {
                    if let Some(session) = weak.upgrade() {
                        // Would deadlock if the lock were still held.
                        assert_eq!(session.pending_count(), 0);
                    }
                })
        });
        session.handle_remote_operation(remote(2, 1, Edit::insert(0, "x")));
    }

    #[test]
    fn test_transport_failure_reports_and_keeps_state() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let errors = Arc::new(Mutex::new(0));
        let count = Arc::clone(&errors);
        let session = SyncSession::new(DocumentId::new("d"), ClientId(1), tx, SessionConfig::default())
            .with_error_callback(move |err| {
                assert!(matches!(err, SyncError::TransportError(_)));
                *count.lock().unwrap() += 1;
            });

        session.send_local_operation(Edit::insert(0, "a"));
        assert_eq!(*errors.lock().unwrap(), 1);
        assert_eq!(session.pending_count(), 1);
        assert!(!session.is_synced());

        assert_eq!(session.retry_pending(), 0);
        assert_eq!(*errors.lock().unwrap(), 2);
    }

    #[test]
    fn test_retry_resends_oldest_first() {
        let (session, mut rx) = session(1);
        session.send_local_operation(Edit::insert(0, "a"));
        session.send_local_operation(Edit::insert(1, "b"));
        while rx.try_recv().is_ok() {}

        assert_eq!(session.retry_pending(), 2);
        let timestamps: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|msg| match msg {
                SyncMessage::Operation { operation, .. } => operation.timestamp,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(timestamps, vec![1, 2]);
    }

    #[test]
    fn test_full_sync_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&snapshot);
        let session = SyncSession::new(DocumentId::new("d"), ClientId(1), tx, SessionConfig::default())
            .with_snapshot_callback(move |text| *slot.lock().unwrap() = Some(text.to_owned()));

        session.request_full_sync();
        assert!(!session.is_synced());
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncMessage::SyncRequest {
                document_id: DocumentId::new("d")
            }
        );

        session.send_local_operation(Edit::insert(0, "a"));
        session.complete_full_sync("authoritative");
        assert!(session.is_synced());
        assert_eq!(session.pending_count(), 0);
        assert_eq!(snapshot.lock().unwrap().as_deref(), Some("authoritative"));
    }
}
