use crate::events::{Direction, EventBus, TransferEvent};
use crate::mesh::MeshHandle;
use crate::transport::Frame;
use bytes::Bytes;
use huddle_core::{CHUNK_SIZE, ErrorKind, FileChunk, PeerMessage, chunk_count};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Send one payload: metadata, then chunks in strictly increasing index
/// order. Each send is acked through the mesh before the next chunk is
/// queued, so in-flight data stays bounded by the peer's channel capacity.
pub(crate) async fn run_outbound(
    mesh: MeshHandle,
    events: EventBus,
    id: Uuid,
    peer: huddle_core::PeerId,
    file_name: String,
    file_type: String,
    data: Bytes,
) {
    let size = data.len() as u64;
    let total = chunk_count(size);

    let fail = |kind: ErrorKind| {
        events.emit_transfer(TransferEvent::Failed {
            id,
            peer: peer.clone(),
            direction: Direction::Outgoing,
            kind,
        });
    };

    let metadata = PeerMessage::FileMetadata {
        message_id: id,
        file_name: file_name.clone(),
        file_size: size,
        file_type: file_type.clone(),
        total_chunks: total,
    };
    let Ok(text) = serde_json::to_string(&metadata) else {
        fail(ErrorKind::TransferCorrupt);
        return;
    };
    if !mesh.send_to_acked(peer.clone(), Frame::Text(text)).await {
        warn!("Transfer {}: peer {} not open for metadata", id, peer);
        fail(ErrorKind::PeerUnreachable);
        return;
    }

    let started = Instant::now();
    let mut sent: u64 = 0;

    for index in 0..total {
        let start = index as usize * CHUNK_SIZE;
        let end = (start + CHUNK_SIZE).min(data.len());
        let chunk = FileChunk {
            message_id: id,
            index,
            total,
            data: data[start..end].to_vec(),
        };
        let Ok(encoded) = chunk.encode() else {
            fail(ErrorKind::TransferCorrupt);
            return;
        };

        if !mesh
            .send_to_acked(peer.clone(), Frame::Binary(Bytes::from(encoded)))
            .await
        {
            // Channel gone mid-transfer: stop sending; the receiver's own
            // stall timeout cleans up its partial buffer.
            warn!("Transfer {} to {} broke at chunk {}", id, peer, index);
            fail(ErrorKind::PeerUnreachable);
            return;
        }

        sent += (end - start) as u64;
        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        let throughput_bps = sent as f64 / elapsed;
        let eta = (throughput_bps > 0.0).then(|| {
            Duration::from_secs_f64((size - sent) as f64 / throughput_bps)
        });
        events.emit_transfer(TransferEvent::Progress {
            id,
            peer: peer.clone(),
            direction: Direction::Outgoing,
            bytes_done: sent,
            total: size,
            throughput_bps,
            eta,
        });
    }

    debug!("Transfer {} to {} complete ({} bytes)", id, peer, size);
    events.emit_transfer(TransferEvent::Completed {
        id,
        peer,
        direction: Direction::Outgoing,
        file_name,
        file_type,
        payload: None,
    });
}
