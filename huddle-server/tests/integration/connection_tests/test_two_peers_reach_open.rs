use crate::integration::{TestEnv, WAIT_MS, wait_for_open_peers};
use huddle_core::PeerId;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn two_clients_negotiate_through_the_relay_and_reach_open() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let mut alice_open = alice.events().subscribe_peer_open();

    let bob = env.client("bob", &room);
    let mut bob_open = bob.events().subscribe_peer_open();

    // alice learns of bob via peer-joined, bob of alice via init-ack; the
    // full offer/answer/candidate exchange rides the relay.
    let opened = timeout(Duration::from_millis(WAIT_MS), alice_open.recv())
        .await
        .expect("alice peer_open")
        .unwrap();
    assert_eq!(opened, PeerId::from("bob"));

    let opened = timeout(Duration::from_millis(WAIT_MS), bob_open.recv())
        .await
        .expect("bob peer_open")
        .unwrap();
    assert_eq!(opened, PeerId::from("alice"));

    assert_eq!(alice.open_peers().await, vec![PeerId::from("bob")]);
    assert_eq!(bob.open_peers().await, vec![PeerId::from("alice")]);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn three_clients_form_a_full_mesh() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let bob = env.client("bob", &room);
    let carol = env.client("carol", &room);

    wait_for_open_peers(&alice, 2).await;
    wait_for_open_peers(&bob, 2).await;
    wait_for_open_peers(&carol, 2).await;

    alice.shutdown().await;
    bob.shutdown().await;
    carol.shutdown().await;
}
