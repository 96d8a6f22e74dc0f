pub mod test_forwarding_rules;
pub mod test_limits;
pub mod test_room_lifecycle;

use huddle_core::{PeerId, SignalEnvelope};
use huddle_server::{AppState, RelaySession};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A relay session driven directly with text frames, with its outbound
/// envelopes captured.
pub struct DirectSession {
    pub session: RelaySession,
    pub outbound: mpsc::UnboundedReceiver<SignalEnvelope>,
}

impl DirectSession {
    pub fn open(state: &Arc<AppState>) -> Self {
        let (tx, outbound) = mpsc::unbounded_channel();
        let session = RelaySession::new(
            state.registry.clone(),
            state.relay.clone(),
            tx,
            state.relay_config.clone(),
        );
        Self { session, outbound }
    }

    pub fn feed(&mut self, env: &SignalEnvelope) -> bool {
        self.session
            .handle_text(&serde_json::to_string(env).expect("serializable envelope"))
    }

    /// Bind into a room and assert the ack, returning the member list.
    pub fn bind(&mut self, room: &str, id: &str) -> Vec<PeerId> {
        assert!(self.feed(&SignalEnvelope::Init {
            room_id: room.to_owned(),
            client_id: PeerId::from(id),
        }));
        match self.outbound.try_recv() {
            Ok(SignalEnvelope::InitAck { members }) => members,
            other => panic!("expected init-ack, got {other:?}"),
        }
    }

    pub fn next(&mut self) -> Option<SignalEnvelope> {
        self.outbound.try_recv().ok()
    }
}
