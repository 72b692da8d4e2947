//! Messaging collaborators.
//!
//! The bridge only needs two seams from a pub/sub system: something that
//! publishes a body onto a topic, and a handler it can register to receive
//! deliveries. `nsq` speaks to real nsqd/nsqlookupd; `memory` keeps the topic
//! in-process.

pub mod memory;
pub mod nsq;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use nsqws_core::error::Result;
use nsqws_core::protocol::Topic;

use crate::config::ConsumerOptions;

pub use memory::MemoryBroker;
pub use nsq::{NsqConsumer, NsqProducer};

/// Publishes opaque bodies. Shared by every reader task, so implementations
/// must be safe for concurrent use.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &Topic, body: Bytes) -> Result<()>;
}

/// Receives deliveries. `Ok` finishes the message; `Err` asks the broker to
/// redeliver it later.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, body: Bytes) -> Result<()>;
}

/// Redelivery delay after `attempts` failed deliveries.
pub fn requeue_delay(opts: &ConsumerOptions, attempts: u16) -> Duration {
    let ms = opts
        .requeue_delay_ms
        .saturating_mul(u64::from(attempts.max(1)))
        .min(opts.max_requeue_delay_ms);
    Duration::from_millis(ms)
}
