use crate::transport::{ConnectorEvent, Frame, PeerConnector, PeerHandle, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use huddle_core::PeerId;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const DATA_CHANNEL_LABEL: &str = "data";

#[derive(Debug, Clone)]
pub struct RtcConfig {
    /// STUN/TURN servers handed to the platform primitive.
    pub ice_servers: Vec<String>,
    /// Pacing ceiling: `send` parks until the channel buffer drains
    /// below this.
    pub buffer_ceiling: usize,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_owned()],
            buffer_ceiling: 1024 * 1024,
        }
    }
}

/// Production [`PeerConnector`] over the `webrtc` crate. Negotiation
/// internals stay in here; the mesh only ever sees opaque payloads.
pub struct WebRtcConnector {
    config: RtcConfig,
}

impl WebRtcConnector {
    pub fn new(config: RtcConfig) -> Self {
        Self { config }
    }

    async fn new_peer_connection(&self) -> Result<Arc<RTCPeerConnection>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.ice_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        api.new_peer_connection(rtc_config)
            .await
            .map(Arc::new)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))
    }
}

/// Trickle ICE and liveness callbacks shared by both negotiation sides.
fn wire_peer_connection(
    pc: &Arc<RTCPeerConnection>,
    peer: &PeerId,
    events: &mpsc::Sender<ConnectorEvent>,
) {
    let state_events = events.clone();
    let state_peer = peer.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = state_events.clone();
        let peer = state_peer.clone();
        Box::pin(async move {
            debug!("Peer connection state for {}: {}", peer, state);
            match state {
                RTCPeerConnectionState::Failed
                | RTCPeerConnectionState::Disconnected
                | RTCPeerConnectionState::Closed => {
                    let _ = events.send(ConnectorEvent::ChannelClosed { peer }).await;
                }
                _ => {}
            }
        })
    }));

    let ice_events = events.clone();
    let ice_peer = peer.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let events = ice_events.clone();
        let peer = ice_peer.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else { return };
            let Ok(init) = candidate.to_json() else { return };
            let Ok(payload) = serde_json::to_value(&init) else {
                return;
            };
            let _ = events.send(ConnectorEvent::Candidate { peer, payload }).await;
        })
    }));
}

fn wire_data_channel(
    dc: &Arc<RTCDataChannel>,
    peer: &PeerId,
    events: &mpsc::Sender<ConnectorEvent>,
    open: &Arc<AtomicBool>,
) {
    let open_events = events.clone();
    let open_peer = peer.clone();
    let open_flag = Arc::clone(open);
    dc.on_open(Box::new(move || {
        let events = open_events.clone();
        let peer = open_peer.clone();
        let open = open_flag.clone();
        Box::pin(async move {
            info!("Data channel open with {}", peer);
            open.store(true, Ordering::SeqCst);
            let _ = events.send(ConnectorEvent::ChannelOpen { peer }).await;
        })
    }));

    let close_events = events.clone();
    let close_peer = peer.clone();
    let close_flag = Arc::clone(open);
    dc.on_close(Box::new(move || {
        let events = close_events.clone();
        let peer = close_peer.clone();
        let open = close_flag.clone();
        Box::pin(async move {
            open.store(false, Ordering::SeqCst);
            let _ = events.send(ConnectorEvent::ChannelClosed { peer }).await;
        })
    }));

    let msg_events = events.clone();
    let msg_peer = peer.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let events = msg_events.clone();
        let peer = msg_peer.clone();
        Box::pin(async move {
            let frame = if msg.is_string {
                Frame::Text(String::from_utf8_lossy(&msg.data).into_owned())
            } else {
                Frame::Binary(Bytes::from(msg.data.to_vec()))
            };
            let _ = events.send(ConnectorEvent::Frame { peer, frame }).await;
        })
    }));
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn initiate(
        &self,
        peer: &PeerId,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError> {
        let pc = self.new_peer_connection().await?;
        wire_peer_connection(&pc, peer, &events);

        let open = Arc::new(AtomicBool::new(false));
        let dc = pc
            .create_data_channel(DATA_CHANNEL_LABEL, None)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        wire_data_channel(&dc, peer, &events, &open);

        let offer = pc
            .create_offer(None)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        pc.set_local_description(offer.clone())
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        let payload = serde_json::to_value(&offer)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let handle = Arc::new(RtcPeerHandle {
            pc,
            dc: Arc::new(Mutex::new(Some(dc))),
            open,
            buffer_ceiling: self.config.buffer_ceiling,
        });
        Ok((handle, payload))
    }

    async fn respond(
        &self,
        peer: &PeerId,
        offer: Value,
        events: mpsc::Sender<ConnectorEvent>,
    ) -> Result<(Arc<dyn PeerHandle>, Value), TransportError> {
        let pc = self.new_peer_connection().await?;
        wire_peer_connection(&pc, peer, &events);

        let open = Arc::new(AtomicBool::new(false));
        let dc_slot: Arc<Mutex<Option<Arc<RTCDataChannel>>>> = Arc::new(Mutex::new(None));

        // The initiator creates the channel; it lands via this callback.
        let slot = Arc::clone(&dc_slot);
        let dc_peer = peer.clone();
        let dc_events = events.clone();
        let dc_open = Arc::clone(&open);
        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let slot = Arc::clone(&slot);
            let peer = dc_peer.clone();
            let events = dc_events.clone();
            let open = Arc::clone(&dc_open);
            Box::pin(async move {
                debug!("Data channel {:?} announced by {}", dc.label(), peer);
                wire_data_channel(&dc, &peer, &events, &open);
                *slot.lock().await = Some(dc);
            })
        }));

        let offer: RTCSessionDescription = serde_json::from_value(offer)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        pc.set_remote_description(offer)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let answer = pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        pc.set_local_description(answer.clone())
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        let payload = serde_json::to_value(&answer)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;

        let handle = Arc::new(RtcPeerHandle {
            pc,
            dc: dc_slot,
            open,
            buffer_ceiling: self.config.buffer_ceiling,
        });
        Ok((handle, payload))
    }
}

struct RtcPeerHandle {
    pc: Arc<RTCPeerConnection>,
    dc: Arc<Mutex<Option<Arc<RTCDataChannel>>>>,
    open: Arc<AtomicBool>,
    buffer_ceiling: usize,
}

#[async_trait]
impl PeerHandle for RtcPeerHandle {
    async fn apply_answer(&self, answer: Value) -> Result<(), TransportError> {
        let answer: RTCSessionDescription = serde_json::from_value(answer)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))
    }

    async fn add_remote_candidate(&self, candidate: Value) -> Result<(), TransportError> {
        let candidate: RTCIceCandidateInit = serde_json::from_value(candidate)
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        self.pc
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| TransportError::NegotiationFailed(e.to_string()))
    }

    async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let dc = self.dc.lock().await.clone().ok_or(TransportError::NotOpen)?;

        match frame {
            Frame::Text(text) => dc.send_text(text).await,
            Frame::Binary(bytes) => dc.send(&bytes).await,
        }
        .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        // Honor the channel's backpressure: park until the SCTP buffer
        // drains below the ceiling before accepting more.
        while dc.buffered_amount().await > self.buffer_ceiling {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let _ = self.pc.close().await;
    }
}
