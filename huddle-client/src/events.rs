use bytes::Bytes;
use huddle_core::{ErrorKind, PeerId, PeerMessage};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A decoded application message from a peer's data channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: PeerId,
    pub message: PeerMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    Progress {
        id: Uuid,
        peer: PeerId,
        direction: Direction,
        bytes_done: u64,
        total: u64,
        throughput_bps: f64,
        eta: Option<Duration>,
    },
    Completed {
        id: Uuid,
        peer: PeerId,
        direction: Direction,
        file_name: String,
        file_type: String,
        /// Reconstructed payload for incoming transfers.
        payload: Option<Bytes>,
    },
    Failed {
        id: Uuid,
        peer: PeerId,
        direction: Direction,
        kind: ErrorKind,
    },
}

#[derive(Debug, Clone)]
pub enum RelayEvent {
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    /// Attempt ceiling reached; the link will not come back by itself.
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub peer: Option<PeerId>,
    pub detail: String,
}

/// Typed publish/subscribe bus: one broadcast channel per event kind.
///
/// Subscribers that lag simply miss events (broadcast semantics); the
/// system defines no history, so that is acceptable by design of the
/// message model.
#[derive(Clone)]
pub struct EventBus {
    peer_open: broadcast::Sender<PeerId>,
    peer_closed: broadcast::Sender<PeerId>,
    message: broadcast::Sender<InboundMessage>,
    transfer: broadcast::Sender<TransferEvent>,
    relay: broadcast::Sender<RelayEvent>,
    error: broadcast::Sender<ErrorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            peer_open: broadcast::channel(capacity).0,
            peer_closed: broadcast::channel(capacity).0,
            message: broadcast::channel(capacity).0,
            transfer: broadcast::channel(capacity).0,
            relay: broadcast::channel(capacity).0,
            error: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_peer_open(&self) -> broadcast::Receiver<PeerId> {
        self.peer_open.subscribe()
    }

    pub fn subscribe_peer_closed(&self) -> broadcast::Receiver<PeerId> {
        self.peer_closed.subscribe()
    }

    pub fn subscribe_message(&self) -> broadcast::Receiver<InboundMessage> {
        self.message.subscribe()
    }

    pub fn subscribe_transfer(&self) -> broadcast::Receiver<TransferEvent> {
        self.transfer.subscribe()
    }

    pub fn subscribe_relay(&self) -> broadcast::Receiver<RelayEvent> {
        self.relay.subscribe()
    }

    pub fn subscribe_error(&self) -> broadcast::Receiver<ErrorEvent> {
        self.error.subscribe()
    }

    pub(crate) fn emit_peer_open(&self, peer: PeerId) {
        let _ = self.peer_open.send(peer);
    }

    pub(crate) fn emit_peer_closed(&self, peer: PeerId) {
        let _ = self.peer_closed.send(peer);
    }

    pub(crate) fn emit_message(&self, msg: InboundMessage) {
        let _ = self.message.send(msg);
    }

    pub(crate) fn emit_transfer(&self, event: TransferEvent) {
        let _ = self.transfer.send(event);
    }

    pub(crate) fn emit_relay(&self, event: RelayEvent) {
        let _ = self.relay.send(event);
    }

    pub(crate) fn emit_error(&self, event: ErrorEvent) {
        let _ = self.error.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
