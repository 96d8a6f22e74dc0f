use crate::events::EventBus;
use crate::link::{LinkConfig, RelayLink};
use crate::mesh::{MeshConfig, MeshHandle, MeshManager};
use crate::transfer::{TransferCommand, TransferConfig, TransferEngine};
use crate::transport::{Frame, PeerConnector, SignalingConnector};
use bytes::Bytes;
use huddle_core::{PeerId, PeerMessage};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub mesh: MeshConfig,
    pub transfer: TransferConfig,
    pub link: LinkConfig,
    /// Send a `roomState` snapshot to each peer whose channel opens.
    pub announce_room_state: bool,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self {
            announce_room_state: true,
            ..Self::default()
        }
    }
}

/// One participant: relay link + mesh + transfer engine, wired together.
///
/// Everything observable comes out of the [`EventBus`]; everything
/// actionable goes in through the handles here.
pub struct Client {
    local: PeerId,
    events: EventBus,
    mesh: MeshHandle,
    transfer_tx: mpsc::Sender<TransferCommand>,
    shutdown_tx: mpsc::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    announce_task: Option<JoinHandle<()>>,
}

impl Client {
    /// Join `room_id` through the relay and start negotiating with every
    /// member already there.
    pub fn connect(
        local: PeerId,
        room_id: impl Into<String>,
        signaling: Arc<dyn SignalingConnector>,
        connector: Arc<dyn PeerConnector>,
        config: ClientConfig,
    ) -> Self {
        let events = EventBus::default();

        let (signal_out_tx, signal_out_rx) = mpsc::unbounded_channel();
        let (to_mesh_tx, to_mesh_rx) = mpsc::channel(256);
        let (frame_tx, frame_rx) = mpsc::channel(256);
        let (transfer_tx, transfer_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let (mesh, mesh_handle) = MeshManager::new(
            local.clone(),
            connector,
            signal_out_tx,
            to_mesh_rx,
            frame_tx,
            events.clone(),
            config.mesh,
        );

        let engine = TransferEngine::new(
            mesh_handle.clone(),
            events.clone(),
            transfer_rx,
            frame_rx,
            config.transfer,
        );

        let link = RelayLink::new(
            signaling,
            room_id,
            local.clone(),
            to_mesh_tx,
            signal_out_rx,
            shutdown_rx,
            events.clone(),
            config.link,
        );

        let tasks = vec![
            tokio::spawn(link.run()),
            tokio::spawn(mesh.run()),
            tokio::spawn(engine.run()),
        ];

        let announce_task = config.announce_room_state.then(|| {
            tokio::spawn(announce_room_state(
                local.clone(),
                mesh_handle.clone(),
                events.clone(),
            ))
        });

        Self {
            local,
            events,
            mesh: mesh_handle,
            transfer_tx,
            shutdown_tx,
            tasks,
            announce_task,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        &self.local
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn mesh(&self) -> &MeshHandle {
        &self.mesh
    }

    /// Broadcast a text message to every open peer.
    pub async fn send_text(&self, content: impl Into<String>) {
        let message = PeerMessage::Message {
            content: content.into(),
            client_id: self.local.clone(),
            timestamp: now_millis(),
        };
        if let Ok(json) = serde_json::to_string(&message) {
            self.mesh.broadcast(Frame::Text(json)).await;
        }
    }

    /// Start a chunked transfer toward one peer. Progress, completion and
    /// failure arrive as transfer events.
    pub async fn send_file(
        &self,
        peer: PeerId,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        data: Bytes,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let _ = self
            .transfer_tx
            .send(TransferCommand::SendFile {
                id,
                peer,
                file_name: file_name.into(),
                file_type: file_type.into(),
                data,
            })
            .await;
        id
    }

    pub async fn open_peers(&self) -> Vec<PeerId> {
        self.mesh.open_peers().await
    }

    /// Deterministic teardown: relay link, every peer connection and every
    /// transfer stop; no timers are left behind.
    pub async fn shutdown(self) {
        // Best-effort goodbye on the data channels; the signaling layer's
        // peer-left covers peers that miss it.
        let goodbye = PeerMessage::UserLeft {
            client_id: self.local.clone(),
        };
        if let Ok(json) = serde_json::to_string(&goodbye) {
            self.mesh.broadcast(Frame::Text(json)).await;
        }

        let _ = self.shutdown_tx.send(()).await;
        let _ = self.transfer_tx.send(TransferCommand::Shutdown).await;
        self.mesh.shutdown().await;
        for task in self.tasks {
            let _ = task.await;
        }
        if let Some(task) = self.announce_task {
            task.abort();
        }
    }
}

/// Greet each newly opened peer with the current room view.
async fn announce_room_state(local: PeerId, mesh: MeshHandle, events: EventBus) {
    let mut peer_open = events.subscribe_peer_open();
    loop {
        let peer = match peer_open.recv().await {
            Ok(peer) => peer,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        let hello = PeerMessage::UserJoined {
            client_id: local.clone(),
        };
        if let Ok(json) = serde_json::to_string(&hello) {
            mesh.send_to(peer.clone(), Frame::Text(json)).await;
        }

        let mut connected_users = mesh.open_peers().await;
        connected_users.push(local.clone());
        let snapshot = PeerMessage::RoomState { connected_users };
        if let Ok(json) = serde_json::to_string(&snapshot) {
            mesh.send_to(peer, Frame::Text(json)).await;
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
