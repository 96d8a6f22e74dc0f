mod error;
mod message;
mod peer;
mod room;
mod signaling;

pub use error::ErrorKind;
pub use message::{CHUNK_SIZE, FileChunk, PeerMessage, chunk_count};
pub use peer::PeerId;
pub use room::{CodeStyle, InvalidRoomCode, RoomCode};
pub use signaling::SignalEnvelope;
