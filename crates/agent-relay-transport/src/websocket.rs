//! WebSocket event channel.

use agent_relay_core::Executor;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::{
    http::AppState,
    protocol::{ClientMessage, ServerMessage},
};

/// Pending control replies per client.
const REPLY_BUFFER: usize = 32;

/// WebSocket upgrade handler for `GET /ws`.
pub async fn ws_handler<E>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<E>>,
) -> impl IntoResponse
where
    E: Executor + 'static,
{
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket<E>(socket: WebSocket, state: AppState<E>)
where
    E: Executor + 'static,
{
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.hub().subscribe_stream();
    tracing::debug!(observers = state.hub().observer_count(), "WebSocket observer connected");

    // Control replies to this client only
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(REPLY_BUFFER);

    let mut send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                event = events.next() => match event {
                    Some(event) => serde_json::to_string(&event),
                    // Hub closed
                    None => break,
                },
                Some(msg) = rx.recv() => serde_json::to_string(&msg),
            };
            let json = match json {
                Ok(j) => j,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                return;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("WebSocket error: {e}");
                    break;
                }
            };
            queue_reply(&tx, &text);
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::debug!("WebSocket observer disconnected");
}

/// Queue the reply to one inbound frame, dropping it if the client is not
/// reading its replies. Returns whether the reply was queued.
fn queue_reply(tx: &mpsc::Sender<ServerMessage>, text: &str) -> bool {
    match tx.try_send(reply_to(text)) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("Dropping WebSocket reply: {e}");
            false
        }
    }
}

/// Reply to one inbound text frame.
fn reply_to(text: &str) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ping) => ServerMessage::Pong,
        Err(e) => {
            tracing::debug!("Invalid client message: {e}");
            ServerMessage::Error {
                message: format!("Invalid message: {e}"),
            }
        }
    }
}
