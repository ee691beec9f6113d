//! WebSocket endpoint for audio-view peers.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};

use crate::AudioController;

/// Router serving the audio-view WebSocket at `/`.
pub fn router(controller: Arc<AudioController>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(controller)
}

async fn ws_handler(
    State(controller): State<Arc<AudioController>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, controller))
}

async fn handle_socket(socket: WebSocket, controller: Arc<AudioController>) {
    tracing::info!("audio-view peer connected");

    let (mut sender, mut receiver) = socket.split();
    let mut outbound = controller.attach_peer();

    let recv_controller = controller.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                recv_controller.handle_frame(&text);
            }
        }
    });

    // send loop: drain the private peer buffer into the socket
    while let Some(msg) = outbound.recv().await {
        let text = match String::from_utf8(msg) {
            Ok(t) => t,
            Err(_) => continue,
        };
        if sender.send(Message::Text(text)).await.is_err() {
            break;
        }
    }

    recv_task.abort();
    tracing::info!("audio-view peer disconnected");
}
