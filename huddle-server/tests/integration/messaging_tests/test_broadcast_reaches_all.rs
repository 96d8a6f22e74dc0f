use crate::integration::{TestEnv, WAIT_MS, wait_for_open_peers};
use huddle_core::{PeerId, PeerMessage};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn broadcast_text_arrives_exactly_once_per_peer() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let bob = env.client("bob", &room);
    let carol = env.client("carol", &room);
    wait_for_open_peers(&alice, 2).await;
    wait_for_open_peers(&bob, 2).await;
    wait_for_open_peers(&carol, 2).await;

    let mut bob_messages = bob.events().subscribe_message();
    let mut carol_messages = carol.events().subscribe_message();

    alice.send_text("hi").await;

    for (name, stream) in [("bob", &mut bob_messages), ("carol", &mut carol_messages)] {
        let inbound = timeout(Duration::from_millis(WAIT_MS), stream.recv())
            .await
            .unwrap_or_else(|_| panic!("{name} never got the message"))
            .unwrap();
        assert_eq!(inbound.from, PeerId::from("alice"));
        match inbound.message {
            PeerMessage::Message {
                content, client_id, ..
            } => {
                assert_eq!(content, "hi");
                assert_eq!(client_id, PeerId::from("alice"));
            }
            other => panic!("expected chat message, got {other:?}"),
        }

        // Exactly once.
        let extra = timeout(Duration::from_millis(200), stream.recv()).await;
        assert!(extra.is_err(), "{name} saw a duplicate: {extra:?}");
    }

    alice.shutdown().await;
    bob.shutdown().await;
    carol.shutdown().await;
}
