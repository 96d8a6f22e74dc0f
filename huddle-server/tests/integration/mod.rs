pub mod connection_tests;
pub mod messaging_tests;
pub mod relay_tests;

use crate::utils::LocalSignaling;
use huddle_client::mock::{MemoryConnector, MemoryHub};
use huddle_client::{Client, ClientConfig};
use huddle_core::{PeerId, RoomCode};
use huddle_server::{AppState, RegistryConfig, RelayConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

pub const WAIT_MS: u64 = 5000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Shared registry/relay plus a mock-connector hub, so whole clients can
/// run in-process against real server sessions.
pub struct TestEnv {
    pub state: Arc<AppState>,
    pub hub: Arc<MemoryHub>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_configs(RegistryConfig::default(), RelayConfig::default())
    }

    pub fn with_configs(registry: RegistryConfig, relay: RelayConfig) -> Self {
        init_tracing();
        Self {
            state: Arc::new(AppState::new(registry, relay)),
            hub: MemoryHub::new(),
        }
    }

    pub fn create_room(&self) -> RoomCode {
        self.state.registry.create_room().expect("room created")
    }

    pub fn client(&self, id: &str, room: &RoomCode) -> Client {
        let config = ClientConfig {
            mesh: huddle_client::MeshConfig {
                negotiation_timeout: Duration::from_secs(5),
                tick_interval: Duration::from_millis(50),
                ..huddle_client::MeshConfig::default()
            },
            announce_room_state: false,
            ..ClientConfig::default()
        };
        Client::connect(
            PeerId::from(id),
            room.as_str(),
            LocalSignaling::new(self.state.clone()),
            Arc::new(MemoryConnector::new(self.hub.clone())),
            config,
        )
    }
}

/// Wait until `client` reports `n` open peers.
pub async fn wait_for_open_peers(client: &Client, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(WAIT_MS);
    loop {
        if client.open_peers().await.len() == n {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {n} open peers"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
