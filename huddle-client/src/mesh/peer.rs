use crate::transport::{Frame, PeerHandle};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Negotiation state for one peer. Initiators walk
/// `Idle -> Offering -> AnswerPending -> Negotiating -> Open`, responders
/// `Idle -> OfferReceived -> Answering -> Negotiating -> Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    Offering,
    AnswerPending,
    OfferReceived,
    Answering,
    Negotiating,
    Open,
    Failed,
    Closed,
}

pub(crate) type WriteReq = (Frame, Option<oneshot::Sender<bool>>);

/// Everything the manager tracks about one peer. Removed when negotiation
/// fails permanently or the channel closes.
pub(crate) struct PeerRecord {
    pub state: PeerState,
    /// Whether we are the side that proposes (lexicographic tie-break).
    pub initiator: bool,
    pub handle: Option<Arc<dyn PeerHandle>>,
    /// Per-peer writer queue; keeps sends FIFO without blocking the
    /// manager loop on a slow channel.
    pub writer: Option<mpsc::Sender<WriteReq>>,
    /// Negotiation failures so far; one retry before giving up.
    pub attempts: u8,
    /// Set when a failed initiator negotiation should re-offer on the
    /// next tick (avoids re-entering the offer path mid-teardown).
    pub needs_offer: bool,
    pub deadline: Option<Instant>,
    /// Candidates that arrived before the handle existed.
    pub pending_candidates: Vec<Value>,
}

impl PeerRecord {
    pub fn new(initiator: bool, deadline: Instant) -> Self {
        Self {
            state: PeerState::Idle,
            initiator,
            handle: None,
            writer: None,
            attempts: 0,
            needs_offer: false,
            deadline: Some(deadline),
            pending_candidates: Vec::new(),
        }
    }
}
