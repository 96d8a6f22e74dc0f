use crate::transport::{SignalingConnector, SignalingTransport, TransportError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use huddle_core::SignalEnvelope;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials the relay's `/ws` endpoint.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl SignalingConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn SignalingTransport>, TransportError> {
        let (stream, _) = connect_async(&self.url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!("WebSocket connected to {}", self.url);

        let (sink, source) = stream.split();
        Ok(Box::new(WsTransport {
            sink: Mutex::new(sink),
            source: Mutex::new(source),
        }))
    }
}

struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
    source: Mutex<SplitStream<WsStream>>,
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn send(&self, env: SignalEnvelope) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(&env).map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&self) -> Option<SignalEnvelope> {
        let mut source = self.source.lock().await;
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(env) => return Some(env),
                    Err(e) => warn!("Undecodable envelope from relay: {}", e),
                },
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => {}
            }
        }
        None
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.close().await;
    }
}
