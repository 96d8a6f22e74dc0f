use crate::integration::{TestEnv, WAIT_MS, wait_for_open_peers};
use bytes::Bytes;
use huddle_client::{Direction, TransferEvent};
use huddle_core::PeerId;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn hundred_kilobytes_arrive_byte_identical() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let bob = env.client("bob", &room);
    wait_for_open_peers(&alice, 1).await;
    wait_for_open_peers(&bob, 1).await;

    let mut bob_transfers = bob.events().subscribe_transfer();
    let mut alice_transfers = alice.events().subscribe_transfer();

    let payload = Bytes::from((0..100 * 1024).map(|i| (i % 239) as u8).collect::<Vec<u8>>());
    let id = alice
        .send_file(
            PeerId::from("bob"),
            "blob.bin",
            "application/octet-stream",
            payload.clone(),
        )
        .await;

    // Sender side reports progress through completion.
    loop {
        let event = timeout(Duration::from_millis(WAIT_MS), alice_transfers.recv())
            .await
            .expect("alice transfer event")
            .unwrap();
        match event {
            TransferEvent::Progress { id: got, .. } => assert_eq!(got, id),
            TransferEvent::Completed {
                id: got, direction, ..
            } => {
                assert_eq!(got, id);
                assert_eq!(direction, Direction::Outgoing);
                break;
            }
            other => panic!("unexpected sender event: {other:?}"),
        }
    }

    // Receiver side reassembles to the exact bytes.
    loop {
        let event = timeout(Duration::from_millis(WAIT_MS), bob_transfers.recv())
            .await
            .expect("bob transfer event")
            .unwrap();
        match event {
            TransferEvent::Progress { direction, .. } => {
                assert_eq!(direction, Direction::Incoming);
            }
            TransferEvent::Completed {
                id: got,
                direction,
                file_name,
                payload: received,
                ..
            } => {
                assert_eq!(got, id);
                assert_eq!(direction, Direction::Incoming);
                assert_eq!(file_name, "blob.bin");
                let received = received.expect("incoming payload");
                assert_eq!(received.len(), 100 * 1024);
                assert_eq!(received, payload);
                break;
            }
            other => panic!("unexpected receiver event: {other:?}"),
        }
    }

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn concurrent_transfers_to_different_peers_complete_independently() {
    let env = TestEnv::new();
    let room = env.create_room();

    let alice = env.client("alice", &room);
    let bob = env.client("bob", &room);
    let carol = env.client("carol", &room);
    wait_for_open_peers(&alice, 2).await;
    wait_for_open_peers(&bob, 2).await;
    wait_for_open_peers(&carol, 2).await;

    let mut bob_transfers = bob.events().subscribe_transfer();
    let mut carol_transfers = carol.events().subscribe_transfer();

    let to_bob = Bytes::from(vec![0xAA; 40 * 1024]);
    let to_carol = Bytes::from(vec![0xBB; 72 * 1024]);
    alice
        .send_file(PeerId::from("bob"), "a.bin", "application/octet-stream", to_bob.clone())
        .await;
    alice
        .send_file(
            PeerId::from("carol"),
            "b.bin",
            "application/octet-stream",
            to_carol.clone(),
        )
        .await;

    for (stream, expected) in [
        (&mut bob_transfers, to_bob),
        (&mut carol_transfers, to_carol),
    ] {
        loop {
            let event = timeout(Duration::from_millis(WAIT_MS), stream.recv())
                .await
                .expect("transfer event")
                .unwrap();
            if let TransferEvent::Completed { payload, .. } = event {
                assert_eq!(payload.expect("incoming payload"), expected);
                break;
            }
        }
    }

    alice.shutdown().await;
    bob.shutdown().await;
    carol.shutdown().await;
}
