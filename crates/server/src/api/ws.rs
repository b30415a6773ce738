//! WebSocket progress stream.
//!
//! Each connected client gets its own subscription to the engine's
//! progress broadcast. Events are serialized as tagged JSON; a slow
//! client misses events instead of slowing the engine down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use atelier_core::ProgressEvent;

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_LAG_EVENTS, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Metric label for a progress event.
fn event_label(event: &ProgressEvent) -> &'static str {
    match event {
        ProgressEvent::Started { .. } => "started",
        ProgressEvent::Update { .. } => "update",
        ProgressEvent::Paused => "paused",
        ProgressEvent::Resumed => "resumed",
        ProgressEvent::Stopped { .. } => "stopped",
        ProgressEvent::Completed { .. } => "completed",
    }
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();
    debug!("WebSocket client connected");

    let mut events = state.engine().subscribe();
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let label = event_label(&event);
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            error!(error = %e, "failed to serialize progress event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                    WS_MESSAGES_SENT.with_label_values(&[label]).inc();
                }
                Err(RecvError::Lagged(skipped)) => {
                    WS_LAG_EVENTS.inc();
                    warn!(skipped, "WebSocket client lagged behind progress stream");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Drain the client side until it closes; clients only listen.
    while let Some(Ok(message)) = receiver.next().await {
        if let Message::Close(_) = message {
            break;
        }
    }

    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    debug!("WebSocket client disconnected");
}
