use std::sync::Arc;

use bytes::Bytes;

use nsqws_core::error::Result;
use nsqws_core::protocol::Topic;

use crate::broker::Publisher;

/// Publishes client payloads to the configured topic.
#[derive(Clone)]
pub struct OutboundBridge {
    publisher: Arc<dyn Publisher>,
    topic: Topic,
}

impl OutboundBridge {
    pub fn new(publisher: Arc<dyn Publisher>, topic: Topic) -> Self {
        Self { publisher, topic }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// One publish, no retry; the caller decides what a failure means.
    pub async fn forward(&self, body: Bytes) -> Result<()> {
        self.publisher.publish(&self.topic, body).await
    }
}
