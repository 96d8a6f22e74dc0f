use serde::{Deserialize, Serialize};

/// Error taxonomy shared by the relay and both client engines.
///
/// Serialized form is what `error` envelopes carry on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    #[error("room not found")]
    RoomNotFound,
    #[error("room expired")]
    RoomExpired,
    #[error("room capacity exceeded")]
    CapacityExceeded,
    #[error("peer unreachable")]
    PeerUnreachable,
    #[error("negotiation timed out")]
    NegotiationTimeout,
    #[error("negotiation failed")]
    NegotiationFailed,
    #[error("transfer stalled")]
    TransferStalled,
    #[error("transfer corrupt")]
    TransferCorrupt,
    #[error("protocol violation")]
    ProtocolViolation,
}
