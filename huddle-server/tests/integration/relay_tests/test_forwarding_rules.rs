use crate::integration::TestEnv;
use crate::integration::relay_tests::DirectSession;
use huddle_core::{ErrorKind, PeerId, SignalEnvelope};
use serde_json::json;

fn offer(from: &str, to: &str) -> SignalEnvelope {
    SignalEnvelope::Offer {
        from: PeerId::from(from),
        to: PeerId::from(to),
        payload: json!({ "sdp": "v=0" }),
    }
}

#[tokio::test]
async fn targeted_envelopes_reach_exactly_the_target() {
    let env = TestEnv::new();
    let room = env.create_room();

    let mut alice = DirectSession::open(&env.state);
    alice.bind(room.as_str(), "alice");
    let mut bob = DirectSession::open(&env.state);
    bob.bind(room.as_str(), "bob");
    let mut carol = DirectSession::open(&env.state);
    carol.bind(room.as_str(), "carol");

    // Drain the join notifications.
    while alice.next().is_some() {}
    while bob.next().is_some() {}

    assert!(alice.feed(&offer("alice", "bob")));

    // Delivered verbatim to bob, and only to bob.
    assert_eq!(bob.next(), Some(offer("alice", "bob")));
    assert_eq!(carol.next(), None);
    assert_eq!(alice.next(), None);
}

#[tokio::test]
async fn spoofed_sender_is_rejected() {
    let env = TestEnv::new();
    let room = env.create_room();

    let mut alice = DirectSession::open(&env.state);
    alice.bind(room.as_str(), "alice");
    let mut bob = DirectSession::open(&env.state);
    bob.bind(room.as_str(), "bob");
    while alice.next().is_some() {}

    // alice's connection claims to be carol.
    assert!(alice.feed(&offer("carol", "bob")));
    match alice.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::ProtocolViolation);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert_eq!(bob.next(), None);
}

#[tokio::test]
async fn absent_target_is_dropped_with_peer_unreachable() {
    let env = TestEnv::new();
    let room = env.create_room();

    let mut alice = DirectSession::open(&env.state);
    alice.bind(room.as_str(), "alice");

    assert!(alice.feed(&offer("alice", "nobody")));
    match alice.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::PeerUnreachable);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
}

#[tokio::test]
async fn envelopes_never_cross_room_boundaries() {
    let env = TestEnv::new();
    let room_one = env.create_room();
    let room_two = env.create_room();

    let mut alice = DirectSession::open(&env.state);
    alice.bind(room_one.as_str(), "alice");
    let mut dave = DirectSession::open(&env.state);
    dave.bind(room_two.as_str(), "dave");

    // dave is live, but in another room: from alice's room he is not a
    // member, so the envelope is dropped, not delivered.
    assert!(alice.feed(&offer("alice", "dave")));
    match alice.next() {
        Some(SignalEnvelope::Error { kind, .. }) => {
            assert_eq!(kind, ErrorKind::PeerUnreachable);
        }
        other => panic!("expected error envelope, got {other:?}"),
    }
    assert_eq!(dave.next(), None);
}

#[tokio::test]
async fn same_member_name_in_two_rooms_stays_isolated() {
    let env = TestEnv::new();
    let room_one = env.create_room();
    let room_two = env.create_room();

    let mut alice_one = DirectSession::open(&env.state);
    alice_one.bind(room_one.as_str(), "alice");
    let mut bob_one = DirectSession::open(&env.state);
    bob_one.bind(room_one.as_str(), "bob");
    let mut bob_two = DirectSession::open(&env.state);
    bob_two.bind(room_two.as_str(), "bob");
    while alice_one.next().is_some() {}

    assert!(alice_one.feed(&offer("alice", "bob")));

    // Only the bob bound in the same room sees it.
    assert_eq!(bob_one.next(), Some(offer("alice", "bob")));
    assert_eq!(bob_two.next(), None);
}
