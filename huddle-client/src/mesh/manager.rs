use crate::events::{ErrorEvent, EventBus};
use crate::mesh::peer::{PeerRecord, PeerState, WriteReq};
use crate::transport::{ConnectorEvent, Frame, PeerConnector, PeerHandle};
use huddle_core::{ErrorKind, PeerId, SignalEnvelope};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// A negotiation not reaching `Open` within this window is torn down
    /// and retried once.
    pub negotiation_timeout: Duration,
    pub tick_interval: Duration,
    /// Per-peer writer queue depth; a full queue drops instead of
    /// buffering without bound.
    pub writer_queue: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            negotiation_timeout: Duration::from_secs(20),
            tick_interval: Duration::from_millis(500),
            writer_queue: 32,
        }
    }
}

pub enum MeshCommand {
    /// Deliver to every `Open` peer; peers still negotiating are skipped.
    Broadcast { frame: Frame },
    /// Deliver to one peer if `Open`. `done` resolves once the transport
    /// accepted the frame (false: skipped or the channel broke).
    SendTo {
        peer: PeerId,
        frame: Frame,
        done: Option<oneshot::Sender<bool>>,
    },
    OpenPeers { reply: oneshot::Sender<Vec<PeerId>> },
    Shutdown,
}

/// Cloneable handle for talking to a running [`MeshManager`].
#[derive(Clone)]
pub struct MeshHandle {
    cmd_tx: mpsc::Sender<MeshCommand>,
}

impl MeshHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<MeshCommand>) -> Self {
        Self { cmd_tx }
    }

    pub async fn broadcast(&self, frame: Frame) {
        let _ = self.cmd_tx.send(MeshCommand::Broadcast { frame }).await;
    }

    pub async fn send_to(&self, peer: PeerId, frame: Frame) {
        let _ = self
            .cmd_tx
            .send(MeshCommand::SendTo {
                peer,
                frame,
                done: None,
            })
            .await;
    }

    /// Send and wait until the peer's transport accepted the frame.
    /// `false` means the peer was not open or the channel broke.
    pub async fn send_to_acked(&self, peer: PeerId, frame: Frame) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(MeshCommand::SendTo {
                peer,
                frame,
                done: Some(done_tx),
            })
            .await
            .is_err()
        {
            return false;
        }
        done_rx.await.unwrap_or(false)
    }

    pub async fn open_peers(&self) -> Vec<PeerId> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(MeshCommand::OpenPeers { reply: reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(MeshCommand::Shutdown).await;
    }
}

/// Keeps one negotiation per known peer and exposes a unified
/// send/broadcast API over whichever channels are open.
///
/// Event loop in the room-actor shape: commands, relay envelopes and
/// connector events funnel into one `select!`.
pub struct MeshManager {
    local: PeerId,
    connector: Arc<dyn PeerConnector>,
    peers: HashMap<PeerId, PeerRecord>,
    cmd_rx: mpsc::Receiver<MeshCommand>,
    signal_rx: mpsc::Receiver<SignalEnvelope>,
    signal_tx: mpsc::UnboundedSender<SignalEnvelope>,
    conn_tx: mpsc::Sender<ConnectorEvent>,
    conn_rx: mpsc::Receiver<ConnectorEvent>,
    frame_tx: mpsc::Sender<(PeerId, Frame)>,
    events: EventBus,
    config: MeshConfig,
}

impl MeshManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        local: PeerId,
        connector: Arc<dyn PeerConnector>,
        signal_tx: mpsc::UnboundedSender<SignalEnvelope>,
        signal_rx: mpsc::Receiver<SignalEnvelope>,
        frame_tx: mpsc::Sender<(PeerId, Frame)>,
        events: EventBus,
        config: MeshConfig,
    ) -> (Self, MeshHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (conn_tx, conn_rx) = mpsc::channel(256);
        let manager = Self {
            local,
            connector,
            peers: HashMap::new(),
            cmd_rx,
            signal_rx,
            signal_tx,
            conn_tx,
            conn_rx,
            frame_tx,
            events,
            config,
        };
        (manager, MeshHandle::new(cmd_tx))
    }

    pub async fn run(mut self) {
        info!("Mesh manager started for {}", self.local);
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(MeshCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                env = self.signal_rx.recv() => match env {
                    Some(env) => self.handle_signal(env).await,
                    None => break,
                },
                evt = self.conn_rx.recv() => {
                    if let Some(evt) = evt {
                        self.handle_connector_event(evt).await;
                    }
                },
                _ = ticker.tick() => self.handle_tick().await,
            }
        }

        self.teardown().await;
        info!("Mesh manager finished for {}", self.local);
    }

    fn handle_command(&mut self, cmd: MeshCommand) {
        match cmd {
            MeshCommand::Broadcast { frame } => {
                for (peer, record) in &self.peers {
                    if record.state != PeerState::Open {
                        continue;
                    }
                    if let Some(writer) = &record.writer {
                        if writer.try_send((frame.clone(), None)).is_err() {
                            warn!("Writer queue full for {}, dropping broadcast frame", peer);
                        }
                    }
                }
            }

            MeshCommand::SendTo { peer, frame, done } => {
                let writer = self
                    .peers
                    .get(&peer)
                    .filter(|r| r.state == PeerState::Open)
                    .and_then(|r| r.writer.clone());

                match writer {
                    Some(writer) => {
                        if let Err(e) = writer.try_send((frame, done)) {
                            warn!("Writer queue full for {}, dropping frame", peer);
                            if let mpsc::error::TrySendError::Full((_, Some(done)))
                            | mpsc::error::TrySendError::Closed((_, Some(done))) = e
                            {
                                let _ = done.send(false);
                            }
                        }
                    }
                    None => {
                        // Not open: skipped by contract, no buffering.
                        if let Some(done) = done {
                            let _ = done.send(false);
                        }
                    }
                }
            }

            MeshCommand::OpenPeers { reply } => {
                let open = self
                    .peers
                    .iter()
                    .filter(|(_, r)| r.state == PeerState::Open)
                    .map(|(id, _)| id.clone())
                    .collect();
                let _ = reply.send(open);
            }

            MeshCommand::Shutdown => unreachable!("handled in run loop"),
        }
    }

    async fn handle_signal(&mut self, env: SignalEnvelope) {
        match env {
            SignalEnvelope::InitAck { members } => {
                for member in members {
                    self.consider_peer(member).await;
                }
            }
            SignalEnvelope::PeerJoined { client_id } => {
                self.consider_peer(client_id).await;
            }
            SignalEnvelope::PeerLeft { client_id } => {
                self.remove_peer(&client_id, true).await;
            }
            SignalEnvelope::Offer { from, payload, .. } => {
                self.on_offer(from, payload).await;
            }
            SignalEnvelope::Answer { from, payload, .. } => {
                self.on_answer(from, payload).await;
            }
            SignalEnvelope::IceCandidate { from, payload, .. } => {
                self.on_candidate(from, payload).await;
            }
            SignalEnvelope::Error { kind, detail } => {
                if kind == ErrorKind::PeerUnreachable {
                    // Expected relay drop; our own timeout logic covers it.
                    debug!("Relay dropped an envelope: {:?}", detail);
                } else {
                    self.events.emit_error(ErrorEvent {
                        kind,
                        peer: None,
                        detail: detail.unwrap_or_default(),
                    });
                }
            }
            SignalEnvelope::Init { .. } => {
                debug!("Ignoring unexpected envelope from relay");
            }
        }
    }

    /// Track a newly discovered member and, if the tie-break says so,
    /// start negotiating. Both sides compute the same decision from the
    /// identifier ordering alone.
    async fn consider_peer(&mut self, peer: PeerId) {
        if peer == self.local || self.peers.contains_key(&peer) {
            return;
        }
        let initiator = self.local < peer;
        let deadline = Instant::now() + self.config.negotiation_timeout;
        self.peers
            .insert(peer.clone(), PeerRecord::new(initiator, deadline));
        debug!(
            "Discovered peer {} (initiator: {})",
            peer, initiator
        );

        if initiator {
            self.start_offer(peer).await;
        }
    }

    async fn start_offer(&mut self, peer: PeerId) {
        if let Some(record) = self.peers.get_mut(&peer) {
            record.state = PeerState::Offering;
        }

        match self.connector.initiate(&peer, self.conn_tx.clone()).await {
            Ok((handle, offer)) => {
                let pending = match self.peers.get_mut(&peer) {
                    Some(record) => {
                        record.handle = Some(handle.clone());
                        record.state = PeerState::AnswerPending;
                        std::mem::take(&mut record.pending_candidates)
                    }
                    // Removed while we negotiated (e.g. peer-left).
                    None => {
                        handle.close().await;
                        return;
                    }
                };
                drain_candidates(&handle, pending, &peer).await;

                self.send_signal(SignalEnvelope::Offer {
                    from: self.local.clone(),
                    to: peer,
                    payload: offer,
                });
            }
            Err(e) => {
                warn!("Failed to create offer for {}: {}", peer, e);
                self.fail_negotiation(&peer, ErrorKind::NegotiationFailed)
                    .await;
            }
        }
    }

    async fn on_offer(&mut self, from: PeerId, payload: Value) {
        if self.local < from {
            // We are the designated initiator toward this peer; a
            // simultaneous offer from them is glare and is ignored.
            warn!("Ignoring glare offer from {}", from);
            return;
        }

        match self.peers.get(&from) {
            Some(record) if record.state != PeerState::Idle => {
                // One negotiation per peer at a time.
                warn!(
                    "Ignoring offer from {} while in {:?}",
                    from, record.state
                );
                return;
            }
            Some(_) => {}
            None => {
                // Offer can beat peer-joined; track the peer now.
                let deadline = Instant::now() + self.config.negotiation_timeout;
                self.peers
                    .insert(from.clone(), PeerRecord::new(false, deadline));
            }
        }

        if let Some(record) = self.peers.get_mut(&from) {
            record.state = PeerState::OfferReceived;
        }

        match self
            .connector
            .respond(&from, payload, self.conn_tx.clone())
            .await
        {
            Ok((handle, answer)) => {
                let pending = match self.peers.get_mut(&from) {
                    Some(record) => {
                        record.handle = Some(handle.clone());
                        record.state = PeerState::Answering;
                        std::mem::take(&mut record.pending_candidates)
                    }
                    None => {
                        handle.close().await;
                        return;
                    }
                };
                drain_candidates(&handle, pending, &from).await;

                self.send_signal(SignalEnvelope::Answer {
                    from: self.local.clone(),
                    to: from.clone(),
                    payload: answer,
                });
                if let Some(record) = self.peers.get_mut(&from) {
                    record.state = PeerState::Negotiating;
                }
            }
            Err(e) => {
                warn!("Failed to answer offer from {}: {}", from, e);
                self.fail_negotiation(&from, ErrorKind::NegotiationFailed)
                    .await;
            }
        }
    }

    async fn on_answer(&mut self, from: PeerId, payload: Value) {
        let handle = match self.peers.get(&from) {
            Some(record) if record.state == PeerState::AnswerPending => record.handle.clone(),
            other => {
                debug!(
                    "Ignoring unexpected answer from {} (state: {:?})",
                    from,
                    other.map(|r| r.state)
                );
                return;
            }
        };

        let Some(handle) = handle else { return };
        match handle.apply_answer(payload).await {
            Ok(()) => {
                if let Some(record) = self.peers.get_mut(&from) {
                    record.state = PeerState::Negotiating;
                }
            }
            Err(e) => {
                warn!("Failed to apply answer from {}: {}", from, e);
                self.fail_negotiation(&from, ErrorKind::NegotiationFailed)
                    .await;
            }
        }
    }

    async fn on_candidate(&mut self, from: PeerId, payload: Value) {
        match self.peers.get_mut(&from) {
            Some(record) => match record.handle.clone() {
                Some(handle) => {
                    if let Err(e) = handle.add_remote_candidate(payload).await {
                        debug!("Candidate from {} rejected: {}", from, e);
                    }
                }
                None => record.pending_candidates.push(payload),
            },
            None => {
                // Candidate ahead of discovery; park it on a fresh record.
                let deadline = Instant::now() + self.config.negotiation_timeout;
                let mut record = PeerRecord::new(self.local < from, deadline);
                record.pending_candidates.push(payload);
                self.peers.insert(from, record);
            }
        }
    }

    async fn handle_connector_event(&mut self, event: ConnectorEvent) {
        match event {
            ConnectorEvent::Candidate { peer, payload } => {
                self.send_signal(SignalEnvelope::IceCandidate {
                    from: self.local.clone(),
                    to: peer,
                    payload,
                });
            }

            ConnectorEvent::ChannelOpen { peer } => {
                let Some(record) = self.peers.get_mut(&peer) else {
                    debug!("Channel opened for unknown peer {}", peer);
                    return;
                };
                if record.state == PeerState::Open {
                    return;
                }
                let Some(handle) = record.handle.clone() else {
                    return;
                };
                record.state = PeerState::Open;
                record.deadline = None;
                record.attempts = 0;
                record.writer = Some(spawn_writer(handle, self.config.writer_queue));
                info!("Peer channel open: {}", peer);
                self.events.emit_peer_open(peer);
            }

            ConnectorEvent::ChannelClosed { peer } => {
                match self.peers.get(&peer).map(|r| r.state) {
                    Some(PeerState::Open) => {
                        self.remove_peer(&peer, true).await;
                    }
                    Some(PeerState::Idle) | None => {}
                    Some(_) => {
                        self.fail_negotiation(&peer, ErrorKind::NegotiationFailed)
                            .await;
                    }
                }
            }

            ConnectorEvent::Frame { peer, frame } => {
                // FIFO per peer is preserved end to end: connector events
                // and this forward both ride ordered channels.
                let _ = self.frame_tx.send((peer, frame)).await;
            }
        }
    }

    async fn handle_tick(&mut self) {
        let now = Instant::now();

        let retries: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, r)| r.needs_offer && r.state == PeerState::Idle)
            .map(|(id, _)| id.clone())
            .collect();
        for peer in retries {
            if let Some(record) = self.peers.get_mut(&peer) {
                record.needs_offer = false;
            }
            self.start_offer(peer).await;
        }

        let overdue: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, r)| {
                r.state != PeerState::Open
                    && r.deadline.is_some_and(|deadline| now >= deadline)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for peer in overdue {
            debug!("Negotiation deadline passed for {}", peer);
            self.fail_negotiation(&peer, ErrorKind::NegotiationTimeout)
                .await;
        }
    }

    /// Tear down a failed negotiation; retry once, then report the peer
    /// unreachable and drop the record. Never touches other peers.
    async fn fail_negotiation(&mut self, peer: &PeerId, kind: ErrorKind) {
        let Some(record) = self.peers.get_mut(peer) else {
            return;
        };

        record.attempts += 1;
        record.writer = None;
        if let Some(handle) = record.handle.take() {
            handle.close().await;
        }
        record.pending_candidates.clear();

        if record.attempts < 2 {
            info!("Retrying negotiation with {} ({})", peer, kind);
            record.state = PeerState::Idle;
            record.deadline = Some(Instant::now() + self.config.negotiation_timeout);
            // Initiators re-offer on the next tick; responders wait for a
            // fresh offer.
            record.needs_offer = record.initiator;
        } else {
            info!("Peer {} unreachable ({})", peer, kind);
            record.state = PeerState::Failed;
            self.events.emit_error(ErrorEvent {
                kind,
                peer: Some(peer.clone()),
                detail: "negotiation did not reach open".into(),
            });
            self.peers.remove(peer);
        }
    }

    /// Drop a peer record; `emit` controls whether an `Open` peer fires
    /// `peer_closed` (exactly once per transition).
    async fn remove_peer(&mut self, peer: &PeerId, emit: bool) {
        let Some(record) = self.peers.remove(peer) else {
            return;
        };
        let was_open = record.state == PeerState::Open;
        if let Some(handle) = record.handle {
            handle.close().await;
        }
        if emit && was_open {
            info!("Peer channel closed: {}", peer);
            self.events.emit_peer_closed(peer.clone());
        }
    }

    async fn teardown(&mut self) {
        let peers: Vec<PeerId> = self.peers.keys().cloned().collect();
        for peer in peers {
            self.remove_peer(&peer, true).await;
        }
    }

    fn send_signal(&self, env: SignalEnvelope) {
        let _ = self.signal_tx.send(env);
    }
}

async fn drain_candidates(handle: &Arc<dyn PeerHandle>, pending: Vec<Value>, peer: &PeerId) {
    for candidate in pending {
        if let Err(e) = handle.add_remote_candidate(candidate).await {
            debug!("Buffered candidate for {} rejected: {}", peer, e);
        }
    }
}

/// Per-peer writer: drains the queue into the handle in order, acking each
/// frame once the transport accepted it.
fn spawn_writer(handle: Arc<dyn PeerHandle>, queue: usize) -> mpsc::Sender<WriteReq> {
    let (tx, mut rx) = mpsc::channel::<WriteReq>(queue);
    tokio::spawn(async move {
        while let Some((frame, done)) = rx.recv().await {
            let ok = handle.send(frame).await.is_ok();
            if let Some(done) = done {
                let _ = done.send(ok);
            }
            if !ok {
                break;
            }
        }
        // Channel broke or the record was dropped: fail whatever queued up.
        rx.close();
        while let Ok((_, done)) = rx.try_recv() {
            if let Some(done) = done {
                let _ = done.send(false);
            }
        }
    });
    tx
}
