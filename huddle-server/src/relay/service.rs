use dashmap::DashMap;
use huddle_core::{PeerId, RoomCode, SignalEnvelope};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

pub type OutboundTx = mpsc::UnboundedSender<SignalEnvelope>;

struct RelayInner {
    conns: DashMap<(RoomCode, PeerId), OutboundTx>,
}

/// Live signaling connections, keyed by room so an envelope can never
/// cross a room boundary.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                conns: DashMap::new(),
            }),
        }
    }

    /// Register a member's connection. A member has at most one live
    /// connection: re-registering replaces the previous sender, which ends
    /// the stale socket's forwarding task.
    pub fn register(&self, room: RoomCode, peer: PeerId, tx: OutboundTx) {
        if self.inner.conns.insert((room, peer.clone()), tx).is_some() {
            warn!("Replaced live connection for member {}", peer);
        }
    }

    /// Drop the registration, but only if it still belongs to `tx`: a
    /// reconnected member's fresh registration must survive the old
    /// session's cleanup.
    pub fn unregister(&self, room: &RoomCode, peer: &PeerId, tx: &OutboundTx) {
        self.inner
            .conns
            .remove_if(&(room.clone(), peer.clone()), |_, live| {
                live.same_channel(tx)
            });
    }

    pub fn is_live(&self, room: &RoomCode, peer: &PeerId) -> bool {
        self.inner.conns.contains_key(&(room.clone(), peer.clone()))
    }

    /// Deliver to one member's live connection. `false` means there is no
    /// live connection (the envelope is dropped).
    pub fn send_to(&self, room: &RoomCode, peer: &PeerId, env: SignalEnvelope) -> bool {
        match self.inner.conns.get(&(room.clone(), peer.clone())) {
            Some(conn) => conn.send(env).is_ok(),
            None => false,
        }
    }

    /// Deliver to every listed member except `except`.
    pub fn broadcast(
        &self,
        room: &RoomCode,
        members: &[PeerId],
        except: &PeerId,
        env: &SignalEnvelope,
    ) {
        for member in members {
            if member == except {
                continue;
            }
            self.send_to(room, member, env.clone());
        }
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}
