use crate::registry::RoomRegistry;
use crate::relay::service::{OutboundTx, RelayService};
use huddle_core::{ErrorKind, PeerId, RoomCode, SignalEnvelope};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Hard ceiling on a single envelope's serialized size.
    pub max_envelope_bytes: usize,
    /// Messages allowed per rate window before the session is closed.
    pub max_messages_per_window: u32,
    pub rate_window: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_envelope_bytes: 64 * 1024,
            max_messages_per_window: 64,
            rate_window: Duration::from_secs(1),
        }
    }
}

struct RateLimiter {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            count: 0,
        }
    }

    fn allow(&mut self, now: Instant, config: &RelayConfig) -> bool {
        if now.saturating_duration_since(self.window_start) >= config.rate_window {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= config.max_messages_per_window
    }
}

#[derive(Debug)]
enum SessionState {
    Unbound,
    Bound { room: RoomCode, peer: PeerId },
    Closed,
}

/// Per-connection signaling state machine: `Unbound -> Bound -> Closed`.
///
/// Decoupled from the WebSocket: the ws handler (and the tests) feed it raw
/// text and read replies from the outbound channel registered at `init`.
pub struct RelaySession {
    registry: Arc<RoomRegistry>,
    relay: RelayService,
    outbound: OutboundTx,
    state: SessionState,
    limiter: RateLimiter,
    config: RelayConfig,
}

impl RelaySession {
    pub fn new(
        registry: Arc<RoomRegistry>,
        relay: RelayService,
        outbound: OutboundTx,
        config: RelayConfig,
    ) -> Self {
        Self {
            registry,
            relay,
            outbound,
            state: SessionState::Unbound,
            limiter: RateLimiter::new(),
            config,
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.state, SessionState::Bound { .. })
    }

    /// Process one inbound text frame. Returns `false` when the connection
    /// must be closed (limits exceeded or session already closed).
    pub fn handle_text(&mut self, text: &str) -> bool {
        if matches!(self.state, SessionState::Closed) {
            return false;
        }

        if text.len() > self.config.max_envelope_bytes {
            warn!("Envelope of {} bytes over ceiling, closing", text.len());
            self.reply(SignalEnvelope::error(
                ErrorKind::ProtocolViolation,
                "envelope too large",
            ));
            self.close();
            return false;
        }

        if !self.limiter.allow(Instant::now(), &self.config) {
            warn!("Message rate ceiling exceeded, closing");
            self.reply(SignalEnvelope::error(
                ErrorKind::ProtocolViolation,
                "message rate exceeded",
            ));
            self.close();
            return false;
        }

        match serde_json::from_str::<SignalEnvelope>(text) {
            Ok(env) => self.handle_envelope(env),
            Err(e) => {
                debug!("Malformed envelope: {}", e);
                self.reply(SignalEnvelope::error(
                    ErrorKind::ProtocolViolation,
                    "malformed envelope",
                ));
                true
            }
        }
    }

    fn handle_envelope(&mut self, env: SignalEnvelope) -> bool {
        let bound = match &self.state {
            SessionState::Unbound => None,
            SessionState::Bound { room, peer } => Some((room.clone(), peer.clone())),
            SessionState::Closed => return false,
        };

        match (bound, env) {
            (None, SignalEnvelope::Init { room_id, client_id }) => {
                self.handle_init(&room_id, client_id);
            }
            (None, other) => {
                debug!("Envelope before init: {:?}", other);
                self.reply(SignalEnvelope::error(
                    ErrorKind::ProtocolViolation,
                    "not bound to a room",
                ));
            }
            (Some(_), SignalEnvelope::Init { .. }) => {
                self.reply(SignalEnvelope::error(
                    ErrorKind::ProtocolViolation,
                    "already bound",
                ));
            }
            (Some((room, peer)), env) => {
                self.forward(&room, &peer, env);
            }
        }
        true
    }

    fn handle_init(&mut self, room_id: &str, client_id: PeerId) {
        let code = match RoomCode::parse(room_id) {
            Ok(code) => code,
            Err(_) => {
                self.reply(SignalEnvelope::error(
                    ErrorKind::ProtocolViolation,
                    "invalid room code",
                ));
                return;
            }
        };

        match self.registry.join_room(&code, &client_id) {
            Ok(members) => {
                self.relay
                    .register(code.clone(), client_id.clone(), self.outbound.clone());
                self.reply(SignalEnvelope::InitAck { members });

                let joined = SignalEnvelope::PeerJoined {
                    client_id: client_id.clone(),
                };
                if let Some(all) = self.registry.members(&code) {
                    self.relay.broadcast(&code, &all, &client_id, &joined);
                }

                info!("Member {} bound to room {}", client_id, code);
                self.state = SessionState::Bound {
                    room: code,
                    peer: client_id,
                };
            }
            Err(kind) => {
                debug!("Join failed for {}: {}", client_id, kind);
                self.reply(SignalEnvelope::Error { kind, detail: None });
            }
        }
    }

    /// Forward a targeted envelope verbatim after validating the sender
    /// identity and the target's membership.
    fn forward(&mut self, room: &RoomCode, bound_peer: &PeerId, env: SignalEnvelope) {
        let Some((from, to)) = env.routing() else {
            self.reply(SignalEnvelope::error(
                ErrorKind::ProtocolViolation,
                "unexpected envelope kind",
            ));
            return;
        };

        if from != bound_peer {
            warn!("Sender {} spoofed as {}", bound_peer, from);
            self.reply(SignalEnvelope::error(
                ErrorKind::ProtocolViolation,
                "sender mismatch",
            ));
            return;
        }

        if !self.registry.is_member(room, to) {
            self.reply(SignalEnvelope::error(
                ErrorKind::PeerUnreachable,
                "target is not a room member",
            ));
            return;
        }

        let to = to.clone();
        self.registry.touch(room, bound_peer);

        // Not fatal: the sender's own retry/timeout logic covers a target
        // whose connection lapsed between membership check and delivery.
        if !self.relay.send_to(room, &to, env) {
            debug!("Dropped envelope for {}: no live connection", to);
            self.reply(SignalEnvelope::error(
                ErrorKind::PeerUnreachable,
                "target has no live connection",
            ));
        }
    }

    /// Tear the session down: leave the room, tell the remaining members,
    /// release the connection slot. Idempotent.
    pub fn close(&mut self) {
        if let SessionState::Bound { room, peer } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            self.registry.leave_room(&room, &peer);
            self.relay.unregister(&room, &peer, &self.outbound);

            let left = SignalEnvelope::PeerLeft {
                client_id: peer.clone(),
            };
            if let Some(remaining) = self.registry.members(&room) {
                self.relay.broadcast(&room, &remaining, &peer, &left);
            }
            info!("Member {} left room {}", peer, room);
        }
    }

    fn reply(&self, env: SignalEnvelope) {
        let _ = self.outbound.send(env);
    }
}
