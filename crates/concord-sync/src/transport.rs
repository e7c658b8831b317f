//! Transport abstraction for sync messages.
//!
//! The transport carries messages between clients and the server. Real
//! implementations (WebSocket, HTTP long-poll) live outside this crate;
//! [`memory`] is an in-process one for tests and simulations.

use std::time::Duration;

use async_trait::async_trait;
use concord_core::ClientId;

use crate::error::Result;
use crate::messages::SyncMessage;

/// Transport trait for sending and receiving sync messages.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to a specific peer.
    async fn send(&self, peer: &ClientId, message: SyncMessage) -> Result<()>;

    /// Receive the next message from any peer.
    ///
    /// Returns the sender's id and the message.
    async fn recv(&self) -> Result<(ClientId, SyncMessage)>;

    /// Receive with timeout.
    ///
    /// Returns None if timeout expires before a message arrives.
    async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(ClientId, SyncMessage)>>;

    /// Broadcast a message to all connected peers.
    async fn broadcast(&self, message: SyncMessage) -> Result<()>;

    /// The local client's identity.
    fn local_client_id(&self) -> ClientId;

    /// List currently connected peers.
    async fn connected_peers(&self) -> Result<Vec<ClientId>>;

    /// Check if a specific peer is connected.
    async fn is_connected(&self, peer: &ClientId) -> bool;
}

/// In-memory transport.
///
/// Every transport created on a [`MemoryNetwork`](memory::MemoryNetwork) gets
/// a bounded inbox; `broadcast` fans out to every other member.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex, RwLock};

    use crate::error::SyncError;

    /// Default inbox capacity per transport.
    pub const DEFAULT_CAPACITY: usize = 1000;

    #[derive(Debug)]
    struct Envelope {
        from: ClientId,
        message: SyncMessage,
    }

    /// Shared state for the memory transport network.
    pub struct MemoryNetwork {
        capacity: usize,
        inboxes: RwLock<HashMap<ClientId, mpsc::Sender<Envelope>>>,
    }

    impl MemoryNetwork {
        pub fn new() -> Arc<Self> {
            Self::with_capacity(DEFAULT_CAPACITY)
        }

        /// A network whose inboxes hold at most `capacity` messages.
        pub fn with_capacity(capacity: usize) -> Arc<Self> {
            Arc::new(Self {
                capacity: capacity.max(1),
                inboxes: RwLock::new(HashMap::new()),
            })
        }

        /// Create a transport connected to this network.
        pub async fn create_transport(self: &Arc<Self>, client_id: ClientId) -> MemoryTransport {
            let (tx, rx) = mpsc::channel(self.capacity);
            self.inboxes.write().await.insert(client_id, tx);

            MemoryTransport {
                client_id,
                network: Arc::clone(self),
                inbox: Mutex::new(rx),
            }
        }

        /// Disconnect a member. Its pending inbox is dropped.
        pub async fn disconnect(&self, client_id: &ClientId) -> bool {
            self.inboxes.write().await.remove(client_id).is_some()
        }
    }

    /// In-memory transport implementation.
    pub struct MemoryTransport {
        client_id: ClientId,
        network: Arc<MemoryNetwork>,
        inbox: Mutex<mpsc::Receiver<Envelope>>,
    }

    impl MemoryTransport {
        fn envelope(&self, message: SyncMessage) -> Envelope {
            Envelope {
                from: self.client_id,
                message,
            }
        }
    }

    #[async_trait]
    impl Transport for MemoryTransport {
        async fn send(&self, peer: &ClientId, message: SyncMessage) -> Result<()> {
            let inboxes = self.network.inboxes.read().await;
            let Some(inbox) = inboxes.get(peer) else {
                return Err(SyncError::PeerNotConnected(peer.to_string()));
            };
            inbox
                .send(self.envelope(message))
                .await
                .map_err(|_| SyncError::TransportError("peer disconnected".into()))
        }

        async fn recv(&self) -> Result<(ClientId, SyncMessage)> {
            let mut inbox = self.inbox.lock().await;
            match inbox.recv().await {
                Some(envelope) => Ok((envelope.from, envelope.message)),
                None => Err(SyncError::TransportError("channel closed".into())),
            }
        }

        async fn recv_timeout(&self, timeout: Duration) -> Result<Option<(ClientId, SyncMessage)>> {
            let mut inbox = self.inbox.lock().await;
            match tokio::time::timeout(timeout, inbox.recv()).await {
                Ok(Some(envelope)) => Ok(Some((envelope.from, envelope.message))),
                Ok(None) => Err(SyncError::TransportError("channel closed".into())),
                Err(_) => Ok(None),
            }
        }

        async fn broadcast(&self, message: SyncMessage) -> Result<()> {
            let inboxes = self.network.inboxes.read().await;
            for (peer, inbox) in inboxes.iter() {
                if peer == &self.client_id {
                    continue;
                }
                // Peers may have gone away mid-broadcast.
                if inbox.send(self.envelope(message.clone())).await.is_err() {
                    tracing::debug!(%peer, "broadcast skipped disconnected peer");
                }
            }
            Ok(())
        }

        fn local_client_id(&self) -> ClientId {
            self.client_id
        }

        async fn connected_peers(&self) -> Result<Vec<ClientId>> {
            let inboxes = self.network.inboxes.read().await;
            Ok(inboxes
                .keys()
                .filter(|id| *id != &self.client_id)
                .copied()
                .collect())
        }

        async fn is_connected(&self, peer: &ClientId) -> bool {
            self.network.inboxes.read().await.contains_key(peer)
        }
    }
}
