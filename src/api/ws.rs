//! WebSocket API with bearer token authentication.
//!
//! The upgrade request must carry `Authorization: Bearer <access token>`.
//! Authentication happens once, before the upgrade is accepted; a rejected
//! handshake gets a 401 and the socket is never opened or registered.

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::auth::{Principal, authenticate_handshake};
use crate::db::Database;
use crate::jwt::{JwtConfig, now_secs};
use crate::relay::{ClientMessage, Relay, ServerMessage};

/// State for WebSocket endpoints.
#[derive(Clone)]
pub struct WsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub relay: Relay,
}

pub fn router(state: WsState) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(
    State(state): State<WsState>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let principal = match authenticate_handshake(&headers, &state.jwt) {
        Ok(principal) => principal,
        Err(rejected) => {
            debug!(reason = %rejected, "WebSocket handshake rejected");
            return rejected.into_response();
        }
    };

    // Check for WebSocket upgrade
    let ws = match ws {
        Ok(ws) => ws,
        Err(_) => {
            return (StatusCode::BAD_REQUEST, "Expected WebSocket upgrade").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, principal))
}

async fn handle_socket(socket: WebSocket, state: WsState, principal: Principal) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending messages
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(32);
    let connection_id = state.relay.register(&principal, tx.clone());
    info!(subject = %principal.subject(), "WebSocket connected");

    let connected = ServerMessage::Connected {
        subject: principal.subject().to_string(),
    };
    let _ = tx.send(connected).await;

    // Spawn task to forward messages to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Ok(json) = serde_json::to_string(&msg) {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    // Spawn ping task to keep connection alive
    let tx_ping = tx.clone();
    let mut ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
        interval.tick().await;
        loop {
            interval.tick().await;
            if tx_ping.send(ServerMessage::Ping).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    let recv_state = state.clone();
    let recv_principal = principal.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    handle_client_message(&recv_state, &recv_principal, &tx, text.as_str()).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for any task to complete (connection closed)
    tokio::select! {
        _ = &mut send_task => {},
        _ = &mut recv_task => {},
        _ = &mut ping_task => {},
    }

    // Clean up
    send_task.abort();
    recv_task.abort();
    ping_task.abort();
    state.relay.unregister(&principal, connection_id);

    info!(subject = %principal.subject(), "WebSocket disconnected");
}

async fn handle_client_message(
    state: &WsState,
    principal: &Principal,
    reply: &mpsc::Sender<ServerMessage>,
    text: &str,
) {
    let error = |message: &str| ServerMessage::Error {
        message: message.to_string(),
    };

    let ClientMessage::Send { recipient, content } = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(_) => {
            let _ = reply.send(error("Invalid message")).await;
            return;
        }
    };

    match state.db.users().exists_by_email(&recipient).await {
        Ok(true) => {}
        Ok(false) => {
            let _ = reply.send(error("Recipient does not exist")).await;
            return;
        }
        Err(e) => {
            warn!(error = %e, "Failed to look up recipient");
            let _ = reply.send(error("Database error")).await;
            return;
        }
    }

    // The sender is always the connection's principal, never client-supplied.
    let message = ServerMessage::Message {
        sender: principal.subject().to_string(),
        recipient: recipient.clone(),
        content,
        timestamp: now_secs().unwrap_or_default(),
    };
    let delivered = state.relay.deliver(&recipient, message);
    debug!(sender = %principal.subject(), %recipient, delivered, "Message relayed");
}
