use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Chunk payload size. Stays under typical data-channel message limits.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Number of chunks needed for a payload of `size` bytes.
pub fn chunk_count(size: u64) -> u32 {
    size.div_ceil(CHUNK_SIZE as u64) as u32
}

/// Application-level message on a negotiated data channel (JSON text frame).
///
/// File chunks are the one exception: they ride as binary frames, see
/// [`FileChunk`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    #[serde(rename = "message")]
    Message {
        content: String,
        client_id: PeerId,
        timestamp: u64,
    },
    #[serde(rename = "file-metadata")]
    FileMetadata {
        message_id: Uuid,
        file_name: String,
        file_size: u64,
        file_type: String,
        total_chunks: u32,
    },
    #[serde(rename = "userJoined")]
    UserJoined { client_id: PeerId },
    #[serde(rename = "userLeft")]
    UserLeft { client_id: PeerId },
    #[serde(rename = "roomState")]
    RoomState { connected_users: Vec<PeerId> },
}

/// One slice of a larger payload, numbered for reassembly.
///
/// Postcard-encoded binary frame; `data` is raw bytes, not base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileChunk {
    pub message_id: Uuid,
    pub index: u32,
    pub total: u32,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

impl FileChunk {
    pub fn encode(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}
