use crate::integration::{TestEnv, WAIT_MS, wait_for_open_peers};
use huddle_core::PeerId;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn leaving_peer_is_removed_and_closed_exactly_once() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let bob = env.client("bob", &room);
    wait_for_open_peers(&alice, 1).await;
    wait_for_open_peers(&bob, 1).await;

    let mut alice_closed = alice.events().subscribe_peer_closed();

    // bob leaves: his session broadcasts peer-left and his channels shut.
    bob.shutdown().await;

    let gone = timeout(Duration::from_millis(WAIT_MS), alice_closed.recv())
        .await
        .expect("alice peer_closed")
        .unwrap();
    assert_eq!(gone, PeerId::from("bob"));

    // The record is gone: no further sends are attempted toward bob.
    assert!(alice.open_peers().await.is_empty());
    assert!(
        !alice
            .mesh()
            .send_to_acked(
                PeerId::from("bob"),
                huddle_client::Frame::Text("late".into())
            )
            .await
    );

    // Exactly once: no second peer_closed arrives.
    let extra = timeout(Duration::from_millis(200), alice_closed.recv()).await;
    assert!(extra.is_err(), "peer_closed must fire once, got {extra:?}");

    // Registry membership reflects the leave; the room itself lingers
    // for the sweep.
    assert!(!env.state.registry.is_member(&room, &PeerId::from("bob")));
    assert!(env.state.registry.is_member(&room, &PeerId::from("alice")));

    alice.shutdown().await;
}
