use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::Client;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Broadcaster, InMemoryBroadcaster, Topic};
use crate::errors::ServiceError;

fn channel_name(namespace: &str, topic: Topic) -> String {
    format!("{}:{}", namespace, topic)
}

/// Publishes topic messages with Redis `PUBLISH` so every application
/// instance can relay them to its own WebSocket subscribers.
#[derive(Clone)]
pub struct RedisBroadcaster {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisBroadcaster {
    pub async fn connect(client: Client, namespace: impl Into<String>) -> Result<Self, ServiceError> {
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ServiceError::EventError(format!("redis connect failed: {}", e)))?;
        Ok(Self {
            conn,
            namespace: namespace.into(),
        })
    }
}

#[async_trait]
impl Broadcaster for RedisBroadcaster {
    async fn publish(&self, topic: Topic, payload: &Value) -> Result<usize, ServiceError> {
        let text = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel_name(&self.namespace, topic))
            .arg(text)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceError::EventError(format!("redis publish failed: {}", e)))?;
        Ok(receivers.max(0) as usize)
    }
}

/// Subscribes to `{namespace}:*` and forwards every message to the local
/// hub. Reconnects after a pause when the subscription drops.
pub async fn relay_redis_to_local(client: Client, namespace: String, hub: Arc<InMemoryBroadcaster>) {
    let pattern = format!("{}:*", namespace);
    let prefix = format!("{}:", namespace);

    loop {
        match client.get_async_connection().await {
            Ok(conn) => {
                let mut pubsub = conn.into_pubsub();
                if let Err(e) = pubsub.psubscribe(&pattern).await {
                    warn!(error = %e, "Redis psubscribe failed");
                } else {
                    info!(%pattern, "Relaying redis topics to local subscribers");
                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let channel = msg.get_channel_name().to_string();
                        let Some(topic) = channel
                            .strip_prefix(&prefix)
                            .and_then(|name| Topic::from_str(name).ok())
                        else {
                            debug!(%channel, "Ignoring message on unknown channel");
                            continue;
                        };
                        match msg.get_payload::<String>() {
                            Ok(text) => {
                                hub.publish_raw(topic, text);
                            }
                            Err(e) => warn!(%channel, error = %e, "Unreadable redis payload"),
                        }
                    }
                    warn!("Redis subscription ended");
                }
            }
            Err(e) => warn!(error = %e, "Redis connection for relay failed"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
}
