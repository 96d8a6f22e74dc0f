use async_trait::async_trait;
use huddle_client::{SignalingConnector, SignalingTransport, TransportError};
use huddle_core::SignalEnvelope;
use huddle_server::{AppState, RelaySession};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// In-process signaling: each `connect` runs a real [`RelaySession`]
/// against the shared registry, glued to channels instead of a WebSocket.
pub struct LocalSignaling {
    state: Arc<AppState>,
}

impl LocalSignaling {
    pub fn new(state: Arc<AppState>) -> Arc<Self> {
        Arc::new(Self { state })
    }
}

#[async_trait]
impl SignalingConnector for LocalSignaling {
    async fn connect(&self) -> Result<Box<dyn SignalingTransport>, TransportError> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, mut in_rx) = mpsc::unbounded_channel::<String>();

        let mut session = RelaySession::new(
            self.state.registry.clone(),
            self.state.relay.clone(),
            out_tx,
            self.state.relay_config.clone(),
        );

        // Mirrors the ws handler: feed frames until either side hangs up,
        // then tear the session down.
        tokio::spawn(async move {
            while let Some(text) = in_rx.recv().await {
                if !session.handle_text(&text) {
                    break;
                }
            }
            session.close();
        });

        Ok(Box::new(LocalTransport {
            to_session: Mutex::new(Some(in_tx)),
            from_session: Mutex::new(out_rx),
        }))
    }
}

struct LocalTransport {
    to_session: Mutex<Option<mpsc::UnboundedSender<String>>>,
    from_session: Mutex<mpsc::UnboundedReceiver<SignalEnvelope>>,
}

#[async_trait]
impl SignalingTransport for LocalTransport {
    async fn send(&self, env: SignalEnvelope) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(&env).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.to_session
            .lock()
            .await
            .as_ref()
            .ok_or(TransportError::Closed)?
            .send(json)
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Option<SignalEnvelope> {
        self.from_session.lock().await.recv().await
    }

    async fn close(&self) {
        // Dropping the sender ends the session task, which runs the
        // leave/peer-left cleanup.
        self.to_session.lock().await.take();
    }
}
