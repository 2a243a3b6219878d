//! WebSocket endpoint streaming newly discovered things.
//!
//! Each socket is registered as one hub subscriber. Broadcast payloads are
//! forwarded as text frames until either side closes.

use crate::server::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use thing_registry::ChannelSubscriber;
use tracing::{debug, info};

/// Upgrade to a WebSocket and subscribe it to new-thing broadcasts.
pub async fn handle_new_things_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| forward_new_things(socket, state))
}

async fn forward_new_things(socket: WebSocket, state: Arc<AppState>) {
    let (subscriber, mut payloads) = ChannelSubscriber::new();
    let id = state.api.register_subscriber(Arc::new(subscriber));
    info!("New things subscriber {} connected", id);

    let (mut sink, mut incoming) = socket.split();
    loop {
        tokio::select! {
            payload = payloads.recv() => {
                let Some(payload) = payload else { break };
                if let Err(e) = sink.send(Message::Text(payload)).await {
                    debug!("Subscriber {} send failed: {}", id, e);
                    break;
                }
            }
            frame = incoming.next() => match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pings are answered by axum; other client frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    // Dropping the receiver closes the subscriber; the hub drops it by id.
    drop(payloads);
    info!("New things subscriber {} disconnected", id);
}
