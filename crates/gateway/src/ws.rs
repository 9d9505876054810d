//! WebSocket endpoint: one connection per realtime subscriber.
//!
//! Outbound frames come from the hub. Inbound frames let a client join a
//! session room or push an outbound text send through the live session.

use {
    axum::{
        extract::{
            State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::IntoResponse,
    },
    futures::{SinkExt, StreamExt},
    serde::Deserialize,
    serde_json::json,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use crate::server::AppState;

/// Frames a subscriber may push.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Join {
        session_key: String,
    },
    SendMessage {
        session_key: String,
        to: String,
        text: String,
    },
}

pub async fn ws_handler(
    State(state): State<AppState>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id, "realtime client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();
    state.hub.register(&conn_id, client_tx.clone());

    // Write loop: hub frames out to the socket.
    let write_conn_id = conn_id.clone();
    let write_handle = tokio::spawn(async move {
        while let Some(frame) = client_rx.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                debug!(conn_id = write_conn_id, "realtime write loop closed");
                break;
            }
        }
    });

    while let Some(message) = ws_rx.next().await {
        let text = match message {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id, error = %e, "realtime read error");
                break;
            },
        };

        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(conn_id, error = %e, "unparseable client frame");
                continue;
            },
        };

        match frame {
            ClientFrame::Join { session_key } => {
                state.hub.join(&conn_id, &session_key);
            },
            ClientFrame::SendMessage {
                session_key,
                to,
                text,
            } => {
                if let Err(e) = state.supervisor.send_text(&session_key, &to, &text).await {
                    warn!(conn_id, session_key, error = %e, "socket send failed");
                    let error = json!({
                        "event": "error",
                        "payload": { "message": "send failed", "error": e.to_string() },
                    });
                    let _ = client_tx.send(error.to_string());
                }
            },
        }
    }

    state.hub.remove(&conn_id);
    write_handle.abort();
    info!(conn_id, "realtime client disconnected");
}
