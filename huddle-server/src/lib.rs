pub mod registry;
pub mod relay;

pub use registry::{RegistryConfig, RoomRegistry, RoomState};
pub use relay::{RelayConfig, RelayService, RelaySession, ws_handler};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use huddle_core::{ErrorKind, PeerId, RoomCode};
use serde::Serialize;
use std::sync::Arc;

/// Shared state behind the axum router.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub relay: RelayService,
    pub relay_config: RelayConfig,
}

impl AppState {
    pub fn new(registry_config: RegistryConfig, relay_config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new(registry_config)),
            relay: RelayService::new(),
            relay_config,
        }
    }
}

/// Room lifecycle (request/response) plus the persistent signaling channel.
pub fn router(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{code}", get(lookup_room))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomCreated {
    room_id: RoomCode,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomInfo {
    room_id: RoomCode,
    members: Vec<PeerId>,
}

fn error_response(kind: ErrorKind) -> Response {
    let status = match kind {
        ErrorKind::RoomNotFound | ErrorKind::RoomExpired => StatusCode::NOT_FOUND,
        ErrorKind::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, kind.to_string()).into_response()
}

async fn create_room(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.create_room() {
        Ok(room_id) => Json(RoomCreated { room_id }).into_response(),
        Err(kind) => error_response(kind),
    }
}

/// Join preflight: both code forms are accepted; membership itself is only
/// ever mutated over the signaling channel.
async fn lookup_room(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    let Ok(code) = RoomCode::parse(&code) else {
        return error_response(ErrorKind::RoomNotFound);
    };
    match state.registry.lookup(&code) {
        Ok(members) => Json(RoomInfo {
            room_id: code,
            members,
        })
        .into_response(),
        Err(kind) => error_response(kind),
    }
}
