use crate::integration::TestEnv;
use crate::integration::relay_tests::DirectSession;
use huddle_core::{ErrorKind, PeerId, SignalEnvelope};

#[tokio::test]
async fn init_against_unknown_room_reports_not_found() {
    let env = TestEnv::new();
    let mut session = DirectSession::open(&env.state);

    assert!(session.feed(&SignalEnvelope::Init {
        room_id: "QQQQQQ".into(),
        client_id: PeerId::from("alice"),
    }));
    match session.next() {
        Some(SignalEnvelope::Error { kind, .. }) => assert_eq!(kind, ErrorKind::RoomNotFound),
        other => panic!("expected error envelope, got {other:?}"),
    }

    // The session survives and can bind to a real room afterwards.
    let room = env.create_room();
    assert!(session.bind(room.as_str(), "alice").is_empty());
}

#[tokio::test]
async fn join_and_leave_notify_the_other_members() {
    let env = TestEnv::new();
    let room = env.create_room();

    let mut alice = DirectSession::open(&env.state);
    assert!(alice.bind(room.as_str(), "alice").is_empty());

    let mut bob = DirectSession::open(&env.state);
    let members = bob.bind(room.as_str(), "bob");
    assert_eq!(members, vec![PeerId::from("alice")]);

    match alice.next() {
        Some(SignalEnvelope::PeerJoined { client_id }) => {
            assert_eq!(client_id, PeerId::from("bob"));
        }
        other => panic!("expected peer-joined, got {other:?}"),
    }

    bob.session.close();
    match alice.next() {
        Some(SignalEnvelope::PeerLeft { client_id }) => {
            assert_eq!(client_id, PeerId::from("bob"));
        }
        other => panic!("expected peer-left, got {other:?}"),
    }
    assert!(!env.state.registry.is_member(&room, &PeerId::from("bob")));
}

#[tokio::test]
async fn both_room_code_forms_are_accepted_on_init() {
    let env = TestEnv::new();
    let room = env.create_room();

    // Short codes are stored uppercase; init with the lowercase form
    // must still land in the same room.
    let mut alice = DirectSession::open(&env.state);
    assert!(alice.bind(&room.as_str().to_ascii_lowercase(), "alice").is_empty());
    assert!(env.state.registry.is_member(&room, &PeerId::from("alice")));
}

#[tokio::test]
async fn malformed_traffic_is_rejected_without_killing_the_session() {
    let env = TestEnv::new();
    let room = env.create_room();
    let mut session = DirectSession::open(&env.state);

    // Garbage JSON.
    assert!(session.session.handle_text("{not json"));
    match session.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }

    // Targeted envelope before init.
    assert!(session.feed(&SignalEnvelope::Offer {
        from: PeerId::from("alice"),
        to: PeerId::from("bob"),
        payload: serde_json::json!({}),
    }));
    match session.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }

    // Still usable.
    assert!(session.bind(room.as_str(), "alice").is_empty());

    // Re-init while bound is a protocol violation too.
    assert!(session.feed(&SignalEnvelope::Init {
        room_id: room.as_str().to_owned(),
        client_id: PeerId::from("alice"),
    }));
    match session.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_room_code_shape_is_a_protocol_violation() {
    let env = TestEnv::new();
    let mut session = DirectSession::open(&env.state);

    assert!(session.feed(&SignalEnvelope::Init {
        room_id: "not a room code!".into(),
        client_id: PeerId::from("alice"),
    }));
    match session.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
}
