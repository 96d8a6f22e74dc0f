use crate::events::{Direction, ErrorEvent, EventBus, InboundMessage, TransferEvent};
use crate::mesh::MeshHandle;
use crate::transfer::incoming::IncomingTransfer;
use crate::transfer::outgoing::run_outbound;
use crate::transport::Frame;
use bytes::Bytes;
use huddle_core::{ErrorKind, FileChunk, PeerId, PeerMessage};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// An inbound transfer with no progress for this long becomes an
    /// error; other transfers are untouched.
    pub stall_timeout: Duration,
    pub tick_interval: Duration,
    /// Ceiling on a declared inbound payload size.
    pub max_file_bytes: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(30),
            tick_interval: Duration::from_secs(1),
            max_file_bytes: 512 * 1024 * 1024,
        }
    }
}

pub enum TransferCommand {
    SendFile {
        id: Uuid,
        peer: PeerId,
        file_name: String,
        file_type: String,
        data: Bytes,
    },
    Shutdown,
}

/// Splits outbound payloads into ordered chunks and reassembles inbound
/// ones; also the router for everything arriving on peer data channels.
///
/// Each outbound transfer runs as its own task, so unrelated transfers
/// never serialize behind one another.
pub struct TransferEngine {
    mesh: MeshHandle,
    events: EventBus,
    cmd_rx: mpsc::Receiver<TransferCommand>,
    frame_rx: mpsc::Receiver<(PeerId, Frame)>,
    incoming: HashMap<(PeerId, Uuid), IncomingTransfer>,
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(
        mesh: MeshHandle,
        events: EventBus,
        cmd_rx: mpsc::Receiver<TransferCommand>,
        frame_rx: mpsc::Receiver<(PeerId, Frame)>,
        config: TransferConfig,
    ) -> Self {
        Self {
            mesh,
            events,
            cmd_rx,
            frame_rx,
            incoming: HashMap::new(),
            config,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(TransferCommand::SendFile { id, peer, file_name, file_type, data }) => {
                        tokio::spawn(run_outbound(
                            self.mesh.clone(),
                            self.events.clone(),
                            id,
                            peer,
                            file_name,
                            file_type,
                            data,
                        ));
                    }
                    Some(TransferCommand::Shutdown) | None => break,
                },
                frame = self.frame_rx.recv() => match frame {
                    Some((peer, frame)) => self.handle_frame(peer, frame),
                    None => break,
                },
                _ = ticker.tick() => self.handle_tick(),
            }
        }
    }

    fn handle_frame(&mut self, peer: PeerId, frame: Frame) {
        match frame {
            Frame::Text(text) => match serde_json::from_str::<PeerMessage>(&text) {
                Ok(PeerMessage::FileMetadata {
                    message_id,
                    file_name,
                    file_size,
                    file_type,
                    total_chunks,
                }) => {
                    self.on_metadata(peer, message_id, file_name, file_size, file_type, total_chunks);
                }
                Ok(message) => {
                    self.events.emit_message(InboundMessage { from: peer, message });
                }
                Err(e) => {
                    warn!("Undecodable text frame from {}: {}", peer, e);
                    self.events.emit_error(ErrorEvent {
                        kind: ErrorKind::ProtocolViolation,
                        peer: Some(peer),
                        detail: "undecodable text frame".into(),
                    });
                }
            },
            Frame::Binary(bytes) => match FileChunk::decode(&bytes) {
                Ok(chunk) => self.on_chunk(peer, chunk),
                Err(e) => {
                    warn!("Undecodable chunk frame from {}: {}", peer, e);
                    self.events.emit_error(ErrorEvent {
                        kind: ErrorKind::ProtocolViolation,
                        peer: Some(peer),
                        detail: "undecodable chunk frame".into(),
                    });
                }
            },
        }
    }

    fn on_metadata(
        &mut self,
        peer: PeerId,
        message_id: Uuid,
        file_name: String,
        file_size: u64,
        file_type: String,
        total_chunks: u32,
    ) {
        if file_size > self.config.max_file_bytes {
            warn!(
                "Rejecting transfer {} from {}: {} bytes over ceiling",
                message_id, peer, file_size
            );
            self.events.emit_error(ErrorEvent {
                kind: ErrorKind::ProtocolViolation,
                peer: Some(peer),
                detail: "declared size over ceiling".into(),
            });
            return;
        }

        let key = (peer.clone(), message_id);
        if self.incoming.contains_key(&key) {
            debug!("Duplicate metadata for transfer {}, ignoring", message_id);
            return;
        }

        info!(
            "Incoming transfer {} from {}: {:?} ({} bytes, {} chunks)",
            message_id, peer, file_name, file_size, total_chunks
        );

        let transfer = IncomingTransfer::new(
            message_id,
            peer.clone(),
            file_name,
            file_type,
            file_size,
            total_chunks,
            Instant::now(),
        );

        if total_chunks == 0 {
            // Empty payload: complete on metadata alone.
            self.complete(transfer);
            return;
        }
        self.incoming.insert(key, transfer);
    }

    fn on_chunk(&mut self, peer: PeerId, chunk: FileChunk) {
        let key = (peer.clone(), chunk.message_id);
        let Some(transfer) = self.incoming.get_mut(&key) else {
            debug!(
                "Chunk for unknown transfer {} from {}, dropping",
                chunk.message_id, peer
            );
            return;
        };

        let now = Instant::now();
        if !transfer.store(chunk.index, Bytes::from(chunk.data), now) {
            warn!(
                "Chunk index {} out of range for transfer {}",
                chunk.index, chunk.message_id
            );
            return;
        }

        let elapsed = now.saturating_duration_since(transfer.started).as_secs_f64();
        let bytes_done = transfer.bytes_received();
        let throughput_bps = bytes_done as f64 / elapsed.max(f64::EPSILON);
        let remaining = transfer.file_size.saturating_sub(bytes_done);
        self.events.emit_transfer(TransferEvent::Progress {
            id: chunk.message_id,
            peer,
            direction: Direction::Incoming,
            bytes_done,
            total: transfer.file_size,
            throughput_bps,
            eta: (throughput_bps > 0.0)
                .then(|| Duration::from_secs_f64(remaining as f64 / throughput_bps)),
        });

        let finished = transfer.is_complete();
        if finished {
            if let Some(transfer) = self.incoming.remove(&key) {
                self.complete(transfer);
            }
        }
    }

    fn complete(&mut self, transfer: IncomingTransfer) {
        let id = transfer.message_id;
        let peer = transfer.peer.clone();
        let file_name = transfer.file_name.clone();
        let file_type = transfer.file_type.clone();
        let declared = transfer.file_size;

        let payload = transfer.assemble();
        if payload.len() as u64 != declared {
            warn!(
                "Transfer {} reassembled to {} bytes, declared {}",
                id,
                payload.len(),
                declared
            );
            self.events.emit_transfer(TransferEvent::Failed {
                id,
                peer,
                direction: Direction::Incoming,
                kind: ErrorKind::TransferCorrupt,
            });
            return;
        }

        info!("Transfer {} from {} complete ({} bytes)", id, peer, declared);
        self.events.emit_transfer(TransferEvent::Completed {
            id,
            peer,
            direction: Direction::Incoming,
            file_name,
            file_type,
            payload: Some(Bytes::from(payload)),
        });
    }

    fn handle_tick(&mut self) {
        let now = Instant::now();
        let stalled: Vec<(PeerId, Uuid)> = self
            .incoming
            .iter()
            .filter(|(_, t)| {
                now.saturating_duration_since(t.last_progress) >= self.config.stall_timeout
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in stalled {
            if let Some(transfer) = self.incoming.remove(&key) {
                warn!(
                    "Transfer {} from {} stalled, dropping partial data",
                    transfer.message_id, transfer.peer
                );
                self.events.emit_transfer(TransferEvent::Failed {
                    id: transfer.message_id,
                    peer: transfer.peer,
                    direction: Direction::Incoming,
                    kind: ErrorKind::TransferStalled,
                });
            }
        }
    }
}
