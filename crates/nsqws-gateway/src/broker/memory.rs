//! In-process topic fan-out.
//!
//! Each subscription owns a bounded queue drained by its own delivery task.
//! A failed delivery is put back on that queue after a backoff, up to
//! `max_attempts`, mirroring how nsqd requeues.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;

use nsqws_core::error::Result;
use nsqws_core::protocol::Topic;

use crate::broker::{requeue_delay, MessageHandler, Publisher};
use crate::config::ConsumerOptions;

#[derive(Debug)]
struct Delivery {
    body: Bytes,
    attempts: u16,
}

pub struct MemoryBroker {
    topics: DashMap<Topic, Vec<mpsc::Sender<Delivery>>>,
    opts: ConsumerOptions,
}

impl MemoryBroker {
    pub fn new(opts: ConsumerOptions) -> Self {
        Self {
            topics: DashMap::new(),
            opts,
        }
    }

    /// Register `handler` for every later publish on `topic`.
    pub fn subscribe(&self, topic: &Topic, handler: Arc<dyn MessageHandler>) {
        let (tx, rx) = mpsc::channel(self.opts.max_in_flight as usize);
        let requeue = tx.downgrade();
        self.topics.entry(topic.clone()).or_default().push(tx);
        tokio::spawn(deliver(rx, requeue, handler, self.opts.clone()));
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|subs| subs.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish(&self, topic: &Topic, body: Bytes) -> Result<()> {
        // Clone the senders out so no map guard is held across an await.
        let subs: Vec<_> = match self.topics.get(topic) {
            Some(subs) => subs.clone(),
            None => return Ok(()),
        };

        let mut closed = false;
        for sub in subs {
            let delivery = Delivery {
                body: body.clone(),
                attempts: 0,
            };
            if sub.send(delivery).await.is_err() {
                closed = true;
            }
        }
        if closed {
            if let Some(mut subs) = self.topics.get_mut(topic) {
                subs.retain(|s| !s.is_closed());
            }
        }
        Ok(())
    }
}

async fn deliver(
    mut rx: mpsc::Receiver<Delivery>,
    requeue: mpsc::WeakSender<Delivery>,
    handler: Arc<dyn MessageHandler>,
    opts: ConsumerOptions,
) {
    while let Some(mut delivery) = rx.recv().await {
        delivery.attempts = delivery.attempts.saturating_add(1);
        let err = match handler.handle_message(delivery.body.clone()).await {
            Ok(()) => continue,
            Err(e) => e,
        };

        if delivery.attempts >= opts.max_attempts {
            tracing::warn!(error = %err, attempts = delivery.attempts, "giving up on message");
            continue;
        }

        let delay = requeue_delay(&opts, delivery.attempts);
        tracing::debug!(error = %err, attempts = delivery.attempts, ?delay, "requeue");
        let Some(tx) = requeue.upgrade() else { break };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(delivery).await.is_err() {
                tracing::debug!("subscription gone before redelivery");
            }
        });
    }
}
