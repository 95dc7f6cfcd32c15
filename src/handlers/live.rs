//! Live dashboard feed.
//!
//! `GET /ws/:topic` upgrades to a WebSocket that receives every message
//! published on that topic, as JSON text. The feed is one-way; anything the
//! client sends other than close is ignored. A client that falls too far
//! behind skips the missed messages and should re-fetch over REST.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use metrics::gauge;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::notifications::{InMemoryBroadcaster, Topic};

pub fn live_routes() -> Router<AppState> {
    Router::new().route("/:topic", get(subscribe))
}

pub async fn subscribe(
    ws: WebSocketUpgrade,
    Path(topic): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ServiceError> {
    let topic = Topic::from_str(&topic)
        .map_err(|_| ServiceError::NotFound(format!("Unknown topic '{}'", topic)))?;

    // Subscribe before upgrading so nothing published during the handshake is lost
    let rx = state.hub.subscribe(topic);
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| forward(socket, topic, rx, hub)))
}

async fn forward(
    socket: WebSocket,
    topic: Topic,
    mut rx: broadcast::Receiver<String>,
    hub: Arc<InMemoryBroadcaster>,
) {
    info!(%topic, "Dashboard subscribed");
    gauge!(
        "branch_reservations.ws.subscribers",
        hub.subscriber_count(topic) as f64,
        "topic" => topic.to_string()
    );

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(text) => {
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%topic, skipped, "Dashboard lagging; messages skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    debug!(%topic, "Dashboard disconnected");
}
