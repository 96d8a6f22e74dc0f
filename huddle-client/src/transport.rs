use async_trait::async_trait;
use bytes::Bytes;
use huddle_core::{PeerId, SignalEnvelope};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),
    #[error("channel not open")]
    NotOpen,
    #[error("closed")]
    Closed,
}

/// One message on a peer data channel: JSON text or a binary chunk frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

/// The persistent connection to the signaling relay.
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn send(&self, env: SignalEnvelope) -> Result<(), TransportError>;

    /// Next inbound envelope; `None` once the connection is gone.
    async fn recv(&self) -> Option<SignalEnvelope>;

    async fn close(&self);
}

/// Dials the relay. Separate from the transport so the reconnect loop can
/// redial after a loss.
#[async_trait]
pub trait SignalingConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SignalingTransport>, TransportError>;
}

/// Events surfaced by a peer connection outside the request/response calls.
#[derive(Debug)]
pub enum ConnectorEvent {
    /// Locally gathered candidate to relay to the remote peer.
    Candidate { peer: PeerId, payload: Value },
    ChannelOpen { peer: PeerId },
    ChannelClosed { peer: PeerId },
    Frame { peer: PeerId, frame: Frame },
}

/// Platform connection-establishment primitive. The mesh manager only
/// brokers payloads; what is inside an offer/answer/candidate is opaque
/// to it.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Start an outgoing negotiation. Returns the handle and the offer
    /// payload to relay.
    async fn initiate(
        &self,
        peer: &PeerId,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError>;

    /// Accept a remote offer. Returns the handle and the answer payload.
    async fn respond(
        &self,
        peer: &PeerId,
        offer: Value,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError>;
}

/// One negotiated (or negotiating) peer connection.
///
/// `send` resolves only once the transport has accepted the frame and its
/// buffer is below the backpressure ceiling; callers pacing on it never
/// enqueue unbounded data.
#[async_trait]
pub trait PeerHandle: Send + Sync {
    async fn apply_answer(&self, answer: Value) -> Result<(), TransportError>;

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), TransportError>;

    async fn send(&self, frame: Frame) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    async fn close(&self);
}
