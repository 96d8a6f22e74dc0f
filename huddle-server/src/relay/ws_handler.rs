use crate::AppState;
use crate::relay::session::RelaySession;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("New signaling connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut session = RelaySession::new(
        state.registry.clone(),
        state.relay.clone(),
        tx,
        state.relay_config.clone(),
    );

    let mut send_task = tokio::spawn(async move {
        while let Some(env) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&env) else {
                continue;
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Read inline so teardown always runs, whichever side drops first.
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if !session.handle_text(&text) {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    session.close();
    send_task.abort();
    info!("Signaling connection closed");
}
