//! Async pumps moving messages between a transport and the registry.
//!
//! Sessions are synchronous; they enqueue outbound messages and expect
//! inbound ones in server order. These two loops are the only async glue.
//! Each handles one message at a time, which preserves that order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::messages::SyncMessage;
use crate::registry::{Dispatch, Dispatcher, SessionRegistry};
use crate::transport::Transport;

/// Counters from a pump run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpReport {
    /// Messages handed to the transport or routed to a session.
    pub delivered: usize,
    /// Messages dropped by the router (unknown type or document, echoes).
    pub ignored: usize,
    /// Messages that failed: transport errors outbound, invalid inbound.
    pub failed: usize,
}

/// Drain the sessions' outbound queue into the transport.
///
/// Runs until every sender of `rx` is dropped. A failed broadcast is reported
/// to the owning session; the pump itself keeps going.
pub async fn pump_outbound<T: Transport + ?Sized>(
    mut rx: mpsc::UnboundedReceiver<SyncMessage>,
    transport: Arc<T>,
    registry: Arc<SessionRegistry>,
) -> PumpReport {
    let mut report = PumpReport::default();

    while let Some(message) = rx.recv().await {
        let document_id = message.document_id().clone();
        match transport.broadcast(message).await {
            Ok(()) => report.delivered += 1,
            Err(err) => {
                report.failed += 1;
                match registry.get(&document_id) {
                    Some(session) => session.report_transport_error(&err),
                    None => tracing::warn!(document = %document_id, error = %err, "send failed"),
                }
            }
        }
    }

    report
}

/// Receive from the transport and route through `dispatcher`.
///
/// Returns once nothing arrives for `idle_timeout` or the transport closes.
/// Invalid messages are logged and skipped.
pub async fn pump_inbound<T, D>(
    transport: Arc<T>,
    dispatcher: Arc<D>,
    idle_timeout: Duration,
) -> PumpReport
where
    T: Transport + ?Sized,
    D: Dispatcher + ?Sized,
{
    let mut report = PumpReport::default();

    loop {
        let (from, message) = match transport.recv_timeout(idle_timeout).await {
            Ok(Some(received)) => received,
            Ok(None) => {
                tracing::debug!("inbound pump idle");
                break;
            }
            Err(SyncError::TransportError(reason)) => {
                tracing::debug!(%reason, "inbound pump closed");
                break;
            }
            Err(err) => {
                tracing::warn!(error = %err, "inbound pump stopped");
                break;
            }
        };

        match dispatcher.dispatch(message) {
            Ok(Dispatch::Ignored) | Ok(Dispatch::Echo) => report.ignored += 1,
            Ok(_) => report.delivered += 1,
            Err(err) => {
                tracing::warn!(%from, error = %err, "rejected inbound message");
                report.failed += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, SyncSession};
    use crate::transport::memory::MemoryNetwork;
    use concord_core::{ClientId, DocumentId, Edit};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_outbound_then_inbound() {
        let network = MemoryNetwork::new();
        let sender = Arc::new(network.create_transport(ClientId(1)).await);
        let receiver = Arc::new(network.create_transport(ClientId(2)).await);

        let doc = DocumentId::new("chan-1");

        let (tx1, rx1) = mpsc::unbounded_channel();
        let registry1 = Arc::new(SessionRegistry::new());
        let session1 = Arc::new(SyncSession::new(doc.clone(), ClientId(1), tx1, SessionConfig::default()));
        registry1.register(Arc::clone(&session1));

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let registry2 = Arc::new(SessionRegistry::new());
        let session2 = Arc::new(SyncSession::new(doc.clone(), ClientId(2), tx2, SessionConfig::default()));
        registry2.register(Arc::clone(&session2));

        session1.send_local_operation(Edit::insert(0, "hi"));
        registry1.unregister(&doc);
        drop(session1);

        let outbound = pump_outbound(rx1, Arc::clone(&sender), Arc::clone(&registry1)).await;
        assert_eq!(outbound.delivered, 1);

        let inbound = pump_inbound(receiver, registry2, Duration::from_millis(20)).await;
        assert_eq!(inbound.delivered, 1);

        let history = session2.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].edit, Edit::insert(0, "hi"));
        assert_eq!(history[0].client_id(), ClientId(1));
    }

    #[tokio::test]
    async fn test_inbound_ignores_unknown_documents() {
        let network = MemoryNetwork::new();
        let a = network.create_transport(ClientId(1)).await;
        let b = Arc::new(network.create_transport(ClientId(2)).await);

        a.send(
            &ClientId(2),
            SyncMessage::Ack {
                document_id: DocumentId::new("nobody"),
                timestamp: 1,
            },
        )
        .await
        .unwrap();

        let report = pump_inbound(b, Arc::new(SessionRegistry::new()), Duration::from_millis(20)).await;
        assert_eq!(report.ignored, 1);
        assert_eq!(report.delivered, 0);
    }

    #[tokio::test]
    async fn test_outbound_failure_reaches_session() {
        struct Broken;

        #[async_trait::async_trait]
        impl Transport for Broken {
            async fn send(&self, _: &ClientId, _: SyncMessage) -> crate::Result<()> {
                Err(SyncError::TransportError("down".into()))
            }
            async fn recv(&self) -> crate::Result<(ClientId, SyncMessage)> {
                Err(SyncError::TransportError("down".into()))
            }
            async fn recv_timeout(
                &self,
                _: Duration,
            ) -> crate::Result<Option<(ClientId, SyncMessage)>> {
                Ok(None)
            }
            async fn broadcast(&self, _: SyncMessage) -> crate::Result<()> {
                Err(SyncError::TransportError("down".into()))
            }
            fn local_client_id(&self) -> ClientId {
                ClientId(1)
            }
            async fn connected_peers(&self) -> crate::Result<Vec<ClientId>> {
                Ok(Vec::new())
            }
            async fn is_connected(&self, _: &ClientId) -> bool {
                false
            }
        }

        let errors = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&errors);
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(
            SyncSession::new(DocumentId::new("d"), ClientId(1), tx, SessionConfig::default())
                .with_error_callback(move |err| seen.lock().unwrap().push(err.to_string())),
        );
        let registry = Arc::new(SessionRegistry::new());
        registry.register(Arc::clone(&session));

        session.send_local_operation(Edit::insert(0, "x"));

        let pump = tokio::spawn(pump_outbound(rx, Arc::new(Broken), Arc::clone(&registry)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        // The session owns the only sender; dropping it ends the pump.
        registry.unregister(&DocumentId::new("d"));
        drop(session);
        let report = pump.await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(errors.lock().unwrap().len(), 1);
    }
}
