pub mod client;
pub mod events;
pub mod link;
pub mod mesh;
pub mod mock;
pub mod rtc;
pub mod transfer;
pub mod transport;
pub mod ws;

pub use client::{Client, ClientConfig};
pub use events::{
    Direction, ErrorEvent, EventBus, InboundMessage, RelayEvent, TransferEvent,
};
pub use link::{Backoff, LinkConfig, RelayLink};
pub use mesh::{MeshCommand, MeshConfig, MeshHandle, MeshManager, PeerState};
pub use rtc::{RtcConfig, WebRtcConnector};
pub use transfer::{TransferCommand, TransferConfig, TransferEngine};
pub use transport::{
    ConnectorEvent, Frame, PeerConnector, PeerHandle, SignalingConnector, SignalingTransport,
    TransportError,
};
pub use ws::WsConnector;
