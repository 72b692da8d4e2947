//! Consuming side: subscribe a topic/channel on every discovered nsqd.
//!
//! Discovery polls each nsqlookupd on an interval and dials any nsqd not
//! already connected. Statically configured nsqd addresses are dialed once
//! and redialed after `reconnect_delay_ms` whenever the connection ends.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tokio::task::JoinHandle;

use nsqws_core::error::Result;
use nsqws_core::protocol::wire::{Command, Frame, Identify, NsqMessage};
use nsqws_core::protocol::{Channel, Topic};

use super::conn::NsqConn;
use super::lookup::Lookupd;
use crate::broker::{requeue_delay, MessageHandler};
use crate::config::ConsumerOptions;
use crate::obs::GatewayMetrics;

pub struct NsqConsumer {
    topic: Topic,
    channel: Channel,
    opts: ConsumerOptions,
    identify: Identify,
    handler: Arc<dyn MessageHandler>,
    metrics: Arc<GatewayMetrics>,
    active: DashSet<String>,
}

impl NsqConsumer {
    pub fn new(
        topic: Topic,
        channel: Channel,
        opts: ConsumerOptions,
        handler: Arc<dyn MessageHandler>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            identify: super::identify(&opts),
            topic,
            channel,
            opts,
            handler,
            metrics,
            active: DashSet::new(),
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Dial `nsqd_addrs` directly and keep them connected.
    pub fn connect_to_nsqds(self: &Arc<Self>, nsqd_addrs: &[String]) -> Vec<JoinHandle<()>> {
        nsqd_addrs
            .iter()
            .cloned()
            .map(|addr| {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    let delay = Duration::from_millis(this.opts.reconnect_delay_ms);
                    loop {
                        this.consume_logged(&addr).await;
                        tokio::time::sleep(delay).await;
                    }
                })
            })
            .collect()
    }

    /// Poll `lookupd_addrs` and follow whatever nsqd they report.
    pub fn connect_to_lookupds(self: &Arc<Self>, lookupd_addrs: Vec<String>) -> Result<JoinHandle<()>> {
        let lookupd = Lookupd::new()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(this.opts.lookupd_poll_interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                for addr in &lookupd_addrs {
                    match lookupd.lookup(addr, &this.topic).await {
                        Ok(nsqds) => {
                            for nsqd in nsqds {
                                this.follow(nsqd);
                            }
                        }
                        Err(e) => tracing::warn!(lookupd = %addr, error = %e, "lookup failed"),
                    }
                }
            }
        }))
    }

    fn follow(self: &Arc<Self>, nsqd: String) {
        if !self.active.insert(nsqd.clone()) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.consume_logged(&nsqd).await;
            // forgotten so the next poll may redial it
            this.active.remove(&nsqd);
        });
    }

    async fn consume_logged(&self, addr: &str) {
        match self.consume(addr).await {
            Ok(()) => tracing::info!(nsqd = %addr, "consumer connection closed"),
            Err(e) => tracing::warn!(nsqd = %addr, error = %e, "consumer connection failed"),
        }
    }

    async fn consume(&self, addr: &str) -> Result<()> {
        let mut conn = NsqConn::connect(addr, &self.identify, self.opts.max_frame_bytes).await?;
        conn.send(&Command::Sub {
            topic: self.topic.clone(),
            channel: self.channel.clone(),
        })
        .await?;
        conn.expect_ok().await?;
        conn.send(&Command::Rdy(self.opts.max_in_flight)).await?;
        tracing::info!(nsqd = %conn.addr(), topic = %self.topic, channel = %self.channel, "subscribed");

        loop {
            match conn.read_frame().await? {
                f if f.is_heartbeat() => conn.send(&Command::Nop).await?,
                Frame::Response(body) if body.as_ref() == b"CLOSE_WAIT" => return Ok(()),
                Frame::Response(body) => {
                    tracing::debug!(body = %String::from_utf8_lossy(&body), "response");
                }
                Frame::Error(body) => {
                    tracing::warn!(nsqd = %conn.addr(), error = %String::from_utf8_lossy(&body), "nsqd error");
                }
                Frame::Message(msg) => {
                    let reply = self.settle(msg).await;
                    conn.send(&reply).await?;
                }
            }
        }
    }

    /// Hand one message to the handler and decide FIN or REQ.
    async fn settle(&self, msg: NsqMessage) -> Command {
        if msg.attempts > self.opts.max_attempts {
            tracing::warn!(id = %msg.id, attempts = msg.attempts, "giving up on message");
            self.metrics.nsq_messages.inc(&[("result", "discarded")]);
            return Command::Fin(msg.id);
        }

        match self.handler.handle_message(msg.body).await {
            Ok(()) => {
                self.metrics.nsq_messages.inc(&[("result", "fin")]);
                Command::Fin(msg.id)
            }
            Err(e) => {
                let delay = requeue_delay(&self.opts, msg.attempts);
                tracing::debug!(id = %msg.id, error = %e, ?delay, "requeue");
                self.metrics.nsq_messages.inc(&[("result", "req")]);
                Command::Req {
                    id: msg.id,
                    delay_ms: delay.as_millis() as u64,
                }
            }
        }
    }
}
