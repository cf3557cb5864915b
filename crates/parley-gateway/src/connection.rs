use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use parley_types::events::{ClientEvent, ServerEvent};

use crate::GatewayState;
use crate::handlers::{self, Flow};

/// Handle one gateway connection. The `user_id` comes from the upgrade
/// request's query string; without it the socket stays anonymous and is
/// never entered into the presence registry.
pub async fn handle_socket(socket: WebSocket, state: GatewayState, user_id: Option<String>) {
    let (mut sender, mut receiver) = socket.split();

    // Every connection gets a targeted channel; registered users expose it
    // through the registry so other handlers can reach them.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let conn_id = match user_id.as_deref() {
        Some(uid) => match state.registry.register(uid, tx.clone()).await {
            Ok(conn_id) => {
                info!("{} connected to gateway ({})", uid, conn_id);
                Some(conn_id)
            }
            Err(e) => {
                warn!("Failed to register {}: {:#}", uid, e);
                None
            }
        },
        None => {
            info!("Anonymous connection to gateway");
            None
        }
    };

    // Forward targeted events to this client.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read events from the client.
    let recv_state = state.clone();
    let reply = tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        if handlers::dispatch(&recv_state, &reply, event).await == Flow::Close {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Bad event frame: {} -- raw: {}",
                            e,
                            &text[..text.len().min(200)]
                        );
                        let _ = reply.send(ServerEvent::Error {
                            message: format!("unrecognized event: {e}"),
                        });
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let (Some(uid), Some(conn_id)) = (user_id.as_deref(), conn_id) {
        match state.registry.release(uid, conn_id).await {
            Ok(true) => info!("{} disconnected from gateway", uid),
            Ok(false) => {} // a newer connection has taken over
            Err(e) => warn!("Failed to release {}: {:#}", uid, e),
        }
    }
}
