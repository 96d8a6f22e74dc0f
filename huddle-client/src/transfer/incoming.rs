use bytes::Bytes;
use huddle_core::PeerId;
use std::time::Instant;
use uuid::Uuid;

/// Reassembly state for one inbound transfer.
///
/// Completed exactly when every index in `[0, total)` has been stored
/// once; duplicates overwrite (last-write-wins) without double-counting.
pub(crate) struct IncomingTransfer {
    pub message_id: Uuid,
    pub peer: PeerId,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub total: u32,
    chunks: Vec<Option<Bytes>>,
    received: u32,
    bytes_received: u64,
    pub started: Instant,
    pub last_progress: Instant,
}

impl IncomingTransfer {
    pub fn new(
        message_id: Uuid,
        peer: PeerId,
        file_name: String,
        file_type: String,
        file_size: u64,
        total: u32,
        now: Instant,
    ) -> Self {
        Self {
            message_id,
            peer,
            file_name,
            file_type,
            file_size,
            total,
            chunks: vec![None; total as usize],
            received: 0,
            bytes_received: 0,
            started: now,
            last_progress: now,
        }
    }

    /// Store a chunk. Returns `false` for an out-of-range index.
    pub fn store(&mut self, index: u32, data: Bytes, now: Instant) -> bool {
        let Some(slot) = self.chunks.get_mut(index as usize) else {
            return false;
        };
        if let Some(old) = slot.take() {
            self.bytes_received -= old.len() as u64;
        } else {
            self.received += 1;
        }
        self.bytes_received += data.len() as u64;
        *slot = Some(data);
        self.last_progress = now;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Concatenate strictly by index order. Only valid once complete.
    pub fn assemble(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.file_size as usize);
        for chunk in self.chunks.into_iter().flatten() {
            payload.extend_from_slice(&chunk);
        }
        payload
    }
}
