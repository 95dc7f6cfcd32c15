use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;

use super::Topic;
use crate::errors::ServiceError;

/// Publishes topic messages to live subscribers.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Sends one payload on `topic`, returning how many subscribers it
    /// reached when the transport can tell.
    async fn publish(&self, topic: Topic, payload: &Value) -> Result<usize, ServiceError>;
}

/// In-process broadcaster: one `tokio::sync::broadcast` channel per topic.
///
/// Messages are pre-serialized JSON text so every WebSocket forwards the
/// same bytes. A subscriber that lags more than `capacity` messages skips
/// ahead and should re-fetch.
pub struct InMemoryBroadcaster {
    channels: DashMap<Topic, broadcast::Sender<String>>,
    capacity: usize,
}

impl InMemoryBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<String> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<String> {
        self.sender(topic).subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels
            .get(&topic)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Forwards already-encoded text, as received from another instance.
    pub fn publish_raw(&self, topic: Topic, text: String) -> usize {
        // No subscribers is not an error
        self.sender(topic).send(text).unwrap_or(0)
    }
}

impl Default for InMemoryBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Broadcaster for InMemoryBroadcaster {
    async fn publish(&self, topic: Topic, payload: &Value) -> Result<usize, ServiceError> {
        let text = serde_json::to_string(payload)?;
        Ok(self.publish_raw(topic, text))
    }
}
