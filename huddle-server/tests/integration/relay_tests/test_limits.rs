use crate::integration::TestEnv;
use crate::integration::relay_tests::DirectSession;
use huddle_core::{ErrorKind, PeerId, SignalEnvelope};
use huddle_server::{RegistryConfig, RelayConfig};
use std::time::Duration;

fn limited_env(max_messages: u32, max_bytes: usize) -> TestEnv {
    TestEnv::with_configs(
        RegistryConfig::default(),
        RelayConfig {
            max_envelope_bytes: max_bytes,
            max_messages_per_window: max_messages,
            rate_window: Duration::from_secs(60),
        },
    )
}

#[tokio::test]
async fn message_rate_ceiling_closes_the_session() {
    let env = limited_env(5, 64 * 1024);
    let room = env.create_room();
    let mut session = DirectSession::open(&env.state);
    session.bind(room.as_str(), "alice");

    let ping = SignalEnvelope::Offer {
        from: PeerId::from("alice"),
        to: PeerId::from("alice"),
        payload: serde_json::json!({}),
    };

    // init consumed one slot; four more pass the limiter.
    for _ in 0..4 {
        assert!(session.feed(&ping));
        session.next();
    }

    // The sixth message in the window trips the ceiling.
    assert!(!session.feed(&ping));
    match session.outbound.try_recv() {
        Ok(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }

    // Closed: the member was removed from the room.
    assert!(!env.state.registry.is_member(&room, &PeerId::from("alice")));
    assert!(!session.feed(&ping));
}

#[tokio::test]
async fn oversized_envelope_closes_the_session() {
    let env = limited_env(1000, 256);
    let room = env.create_room();
    let mut session = DirectSession::open(&env.state);
    session.bind(room.as_str(), "alice");

    let huge = SignalEnvelope::Offer {
        from: PeerId::from("alice"),
        to: PeerId::from("bob"),
        payload: serde_json::json!({ "sdp": "x".repeat(1024) }),
    };
    assert!(!session.feed(&huge));
    match session.outbound.try_recv() {
        Ok(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert!(!env.state.registry.is_member(&room, &PeerId::from("alice")));
}
