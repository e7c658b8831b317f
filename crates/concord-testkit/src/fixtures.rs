//! Test fixtures and helpers.
//!
//! A [`Replica`] is one client's view of a document: its session and the
//! text it displays. Messages are delivered by hand, so tests choose the
//! interleaving.

use std::sync::Arc;

use concord_core::{apply, diff, ClientId, DocumentId, Edit, Operation};
use concord_sync::{SessionConfig, SyncMessage, SyncSession};
use tokio::sync::mpsc;

/// One client's session and displayed text.
pub struct Replica {
    pub session: Arc<SyncSession>,
    pub text: String,
    outbox: mpsc::UnboundedReceiver<SyncMessage>,
}

impl Replica {
    /// Create a replica of `document_id` starting from `base`.
    pub fn new(document_id: DocumentId, client_id: ClientId, base: &str) -> Self {
        let (tx, outbox) = mpsc::unbounded_channel();
        let session = SyncSession::new(document_id, client_id, tx, SessionConfig::default());
        Self {
            session: Arc::new(session),
            text: base.to_owned(),
            outbox,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.session.client_id()
    }

    /// Apply a local edit and send it.
    pub fn edit(&mut self, edit: Edit) -> Operation {
        let op = self.session.send_local_operation(edit);
        self.text = apply(&self.text, &op);
        op
    }

    /// Replace the whole text, sending the diff. `None` if nothing changed.
    pub fn type_text(&mut self, new_text: &str) -> Option<Operation> {
        let edit = diff(&self.text, new_text)?;
        Some(self.edit(edit))
    }

    /// Receive a remote operation and apply what the session hands back.
    pub fn receive(&mut self, op: Operation) -> Option<Operation> {
        let applied = self.session.handle_remote_operation(op)?;
        self.text = apply(&self.text, &applied);
        Some(applied)
    }

    pub fn ack(&self, timestamp: u64) -> bool {
        self.session.acknowledge_local_operation(timestamp)
    }

    /// Take every message the session queued, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<SyncMessage> {
        std::iter::from_fn(|| self.outbox.try_recv().ok()).collect()
    }

    /// Take the queued operations, dropping other messages.
    pub fn drain_operations(&mut self) -> Vec<Operation> {
        self.drain_outbox()
            .into_iter()
            .filter_map(|message| match message {
                SyncMessage::Operation { operation, .. } => Operation::try_from(operation).ok(),
                _ => None,
            })
            .collect()
    }
}

/// Two replicas of the same document.
pub struct TestFixture {
    pub document_id: DocumentId,
    pub alice: Replica,
    pub bob: Replica,
}

impl TestFixture {
    /// Alice is client 1, Bob client 2, both starting from `base`.
    pub fn new(base: &str) -> Self {
        Self::with_clients(base, ClientId(1), ClientId(2))
    }

    /// Two replicas with the given client ids.
    pub fn with_clients(base: &str, alice: ClientId, bob: ClientId) -> Self {
        let document_id = DocumentId::new("test-doc");
        Self {
            alice: Replica::new(document_id.clone(), alice, base),
            bob: Replica::new(document_id.clone(), bob, base),
            document_id,
        }
    }

    /// Deliver everything in flight both ways, then acknowledge it.
    ///
    /// Each side receives the other's operations in the order they were
    /// sent, as a relaying server would deliver them.
    pub fn exchange(&mut self) {
        let from_alice = self.alice.drain_operations();
        let from_bob = self.bob.drain_operations();

        for op in &from_alice {
            self.bob.receive(op.clone());
        }
        for op in &from_bob {
            self.alice.receive(op.clone());
        }
        for op in &from_alice {
            self.alice.ack(op.timestamp());
        }
        for op in &from_bob {
            self.bob.ack(op.timestamp());
        }
    }

    pub fn converged(&self) -> bool {
        self.alice.text == self.bob.text
    }
}

/// `count` replicas of one document with client ids `1..=count`.
pub fn replicas(base: &str, count: u32) -> Vec<Replica> {
    let document_id = DocumentId::new("test-doc");
    (1..=count)
        .map(|id| Replica::new(document_id.clone(), ClientId(id), base))
        .collect()
}
