use crate::model::error::ErrorKind;
use crate::model::peer::PeerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on the relay's persistent signaling channel.
///
/// `offer`/`answer`/`ice-candidate` payloads are opaque to the relay and
/// forwarded verbatim; only `from`/`to` are inspected for routing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum SignalEnvelope {
    Init {
        room_id: String,
        client_id: PeerId,
    },
    InitAck {
        members: Vec<PeerId>,
    },
    PeerJoined {
        client_id: PeerId,
    },
    PeerLeft {
        client_id: PeerId,
    },
    Offer {
        from: PeerId,
        to: PeerId,
        payload: Value,
    },
    Answer {
        from: PeerId,
        to: PeerId,
        payload: Value,
    },
    IceCandidate {
        from: PeerId,
        to: PeerId,
        payload: Value,
    },
    Error {
        kind: ErrorKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl SignalEnvelope {
    /// `(from, to)` for the targeted kinds, `None` for broadcast kinds.
    pub fn routing(&self) -> Option<(&PeerId, &PeerId)> {
        match self {
            Self::Offer { from, to, .. }
            | Self::Answer { from, to, .. }
            | Self::IceCandidate { from, to, .. } => Some((from, to)),
            _ => None,
        }
    }

    pub fn error(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Error {
            kind,
            detail: Some(detail.into()),
        }
    }
}
