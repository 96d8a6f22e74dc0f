//! In-memory peer connections for tests and simulations.
//!
//! A [`MemoryHub`] pairs the two ends of a negotiation the way a real
//! connector would over ICE: `initiate` parks the initiator's half until
//! the answer comes back, `respond` opens the responder's half
//! immediately.

use crate::transport::{ConnectorEvent, Frame, PeerConnector, PeerHandle, TransportError};
use async_trait::async_trait;
use huddle_core::PeerId;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

struct PendingLink {
    responder_out: mpsc::UnboundedSender<Frame>,
    responder_in: mpsc::UnboundedReceiver<Frame>,
}

/// Shared registry pairing offers with their answers across connectors.
#[derive(Default)]
pub struct MemoryHub {
    links: Mutex<HashMap<Uuid, PendingLink>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

/// [`PeerConnector`] over in-process channels.
pub struct MemoryConnector {
    hub: Arc<MemoryHub>,
    fail: bool,
}

impl MemoryConnector {
    pub fn new(hub: Arc<MemoryHub>) -> Self {
        Self { hub, fail: false }
    }

    /// A connector whose negotiations always error, for failure-path
    /// tests.
    pub fn failing(hub: Arc<MemoryHub>) -> Self {
        Self { hub, fail: true }
    }
}

#[async_trait]
impl PeerConnector for MemoryConnector {
    async fn initiate(
        &self,
        peer: &PeerId,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError> {
        if self.fail {
            return Err(TransportError::NegotiationFailed("mock failure".into()));
        }

        let link = Uuid::new_v4();
        let (initiator_out, responder_in) = mpsc::unbounded_channel();
        let (responder_out, initiator_in) = mpsc::unbounded_channel();

        if let Ok(mut links) = self.hub.links.lock() {
            links.insert(
                link,
                PendingLink {
                    responder_out,
                    responder_in,
                },
            );
        }

        // A token candidate so the ice-candidate leg of the protocol is
        // exercised end to end.
        let _ = events
            .send(ConnectorEvent::Candidate {
                peer: peer.clone(),
                payload: json!({ "candidate": "memory:0" }),
            })
            .await;

        let handle = Arc::new(MemoryHandle {
            peer: peer.clone(),
            out: Mutex::new(Some(initiator_out)),
            parked_in: Mutex::new(Some(initiator_in)),
            open: Arc::new(AtomicBool::new(false)),
            events,
        });
        Ok((handle, json!({ "link": link })))
    }

    async fn respond(
        &self,
        peer: &PeerId,
        offer: Value,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError> {
        if self.fail {
            return Err(TransportError::NegotiationFailed("mock failure".into()));
        }

        let link: Uuid = offer
            .get("link")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| TransportError::NegotiationFailed("malformed offer".into()))?;

        let pending = self
            .hub
            .links
            .lock()
            .ok()
            .and_then(|mut links| links.remove(&link))
            .ok_or_else(|| TransportError::NegotiationFailed("unknown link".into()))?;

        let handle = Arc::new(MemoryHandle {
            peer: peer.clone(),
            out: Mutex::new(Some(pending.responder_out)),
            parked_in: Mutex::new(None),
            open: Arc::new(AtomicBool::new(false)),
            events: events.clone(),
        });
        handle.open_with(pending.responder_in).await;

        Ok((handle, json!({ "link": link })))
    }
}

struct MemoryHandle {
    peer: PeerId,
    out: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    /// Initiator's inbound half, parked until the answer arrives.
    parked_in: Mutex<Option<mpsc::UnboundedReceiver<Frame>>>,
    open: Arc<AtomicBool>,
    events: mpsc::Sender<ConnectorEvent>,
}

impl MemoryHandle {
    async fn open_with(&self, mut inbound: mpsc::UnboundedReceiver<Frame>) {
        self.open.store(true, Ordering::SeqCst);
        let _ = self
            .events
            .send(ConnectorEvent::ChannelOpen {
                peer: self.peer.clone(),
            })
            .await;

        let peer = self.peer.clone();
        let events = self.events.clone();
        let open = Arc::clone(&self.open);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if events
                    .send(ConnectorEvent::Frame {
                        peer: peer.clone(),
                        frame,
                    })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            // Far end dropped its sender.
            if open.swap(false, Ordering::SeqCst) {
                let _ = events.send(ConnectorEvent::ChannelClosed { peer }).await;
            }
        });
    }
}

#[async_trait]
impl PeerHandle for MemoryHandle {
    async fn apply_answer(&self, _answer: Value) -> Result<(), TransportError> {
        let inbound = self
            .parked_in
            .lock()
            .ok()
            .and_then(|mut parked| parked.take())
            .ok_or_else(|| TransportError::NegotiationFailed("no parked channel".into()))?;
        self.open_with(inbound).await;
        Ok(())
    }

    async fn add_remote_candidate(&self, _candidate: Value) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotOpen);
        }
        let sender = self
            .out
            .lock()
            .ok()
            .and_then(|out| out.clone())
            .ok_or(TransportError::NotOpen)?;
        sender
            .send(frame)
            .map_err(|_| TransportError::SendFailed("far end gone".into()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        if let Ok(mut out) = self.out.lock() {
            out.take();
        }
    }
}
