//! Axum websocket endpoint.
//!
//! Each socket owns a read half and a write half. The read half parses
//! join/leave frames; each joined room gets a forwarding task that
//! copies frames from the room's broadcast channel into the socket's
//! outbound queue. All forwarding tasks die with the socket.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::gateway::RealtimeGateway;
use crate::protocol::{ClientMessage, ServerMessage};

#[derive(Clone)]
pub struct RealtimeState {
    pub gateway: Arc<RealtimeGateway>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<RealtimeState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway))
}

async fn handle_socket(socket: WebSocket, gateway: Arc<RealtimeGateway>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(64);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(error) => {
                    warn!(%error, "failed to serialize outbound frame");
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::JoinRoom { room }) => {
                if subscriptions.contains_key(&room) {
                    continue;
                }
                debug!(room, "socket joined room");
                let (mut room_rx, snapshot) = gateway.join_with_snapshot(&room).await;
                if let Some(snapshot) = snapshot {
                    if outbound_tx.send(snapshot).await.is_err() {
                        break;
                    }
                }
                let forward_tx = outbound_tx.clone();
                let handle = tokio::spawn(async move {
                    while let Ok(frame) = room_rx.recv().await {
                        if forward_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                });
                subscriptions.insert(room, handle);
            }
            Ok(ClientMessage::LeaveRoom { room }) => {
                if let Some(handle) = subscriptions.remove(&room) {
                    debug!(room, "socket left room");
                    handle.abort();
                }
            }
            Err(error) => {
                debug!(%error, "unparseable client frame");
                let _ = outbound_tx
                    .send(ServerMessage::Error {
                        message: "无法解析的消息".to_string(),
                    })
                    .await;
            }
        }
    }

    for handle in subscriptions.into_values() {
        handle.abort();
    }
    writer.abort();
}
