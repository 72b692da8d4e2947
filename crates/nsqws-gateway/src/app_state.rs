//! Shared application state and startup wiring.
//!
//! `AppState::start` builds the hub, the broker collaborators for the
//! configured kind, and both bridges. Startup errors are returned, not
//! panicked on, so `main` can report them.

use std::sync::Arc;
use std::time::Duration;

use nsqws_core::error::Result;

use crate::bridge::{InboundBridge, OutboundBridge};
use crate::broker::{nsq, MemoryBroker, NsqConsumer, NsqProducer, Publisher};
use crate::config::{BrokerKind, GatewayConfig};
use crate::obs::GatewayMetrics;
use crate::realtime::{Hub, HubHandle};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    hub: HubHandle,
    outbound: OutboundBridge,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Assemble state from already-running parts.
    pub fn new(
        cfg: GatewayConfig,
        hub: HubHandle,
        outbound: OutboundBridge,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                hub,
                outbound,
                metrics,
            }),
        }
    }

    /// Start the hub and broker side for `cfg`.
    pub async fn start(cfg: GatewayConfig) -> Result<Self> {
        let metrics = Arc::new(GatewayMetrics::default());
        let (hub, _hub_task) = Hub::spawn(cfg.gateway.hub_inbox, Arc::clone(&metrics));
        let inbound = Arc::new(InboundBridge::new(hub.clone(), Arc::clone(&metrics)));

        let broker = &cfg.broker;
        let topic = broker.topic()?;
        let channel = broker.channel()?;

        let publisher: Arc<dyn Publisher> = match broker.kind {
            BrokerKind::Memory => {
                let memory = Arc::new(MemoryBroker::new(broker.consumer.clone()));
                memory.subscribe(&topic, inbound);
                tracing::info!(%topic, "using in-process broker");
                memory as Arc<dyn Publisher>
            }
            BrokerKind::Nsq => {
                let identify = nsq::identify(&broker.consumer);
                let producer = Arc::new(NsqProducer::new(
                    broker.nsqd_tcp_address.clone(),
                    identify,
                    broker.consumer.max_frame_bytes,
                ));
                wait_for_nsqd(&producer).await;

                let consumer = Arc::new(NsqConsumer::new(
                    topic.clone(),
                    channel,
                    broker.consumer.clone(),
                    inbound,
                    Arc::clone(&metrics),
                ));
                tracing::info!(%topic, channel = %consumer.channel(), "subscribing");
                consumer.connect_to_nsqds(&broker.nsqd_tcp_addresses);
                if !broker.lookupd_http_addresses.is_empty() {
                    consumer.connect_to_lookupds(broker.lookupd_http_addresses.clone())?;
                }
                producer as Arc<dyn Publisher>
            }
        };

        let outbound = OutboundBridge::new(publisher, topic);
        Ok(Self::new(cfg, hub, outbound, metrics))
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn hub(&self) -> HubHandle {
        self.inner.hub.clone()
    }

    pub fn outbound(&self) -> &OutboundBridge {
        &self.inner.outbound
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.inner.metrics
    }
}

/// Block until nsqd answers, retrying every second.
async fn wait_for_nsqd(producer: &NsqProducer) {
    loop {
        match producer.ping().await {
            Ok(()) => {
                tracing::info!(nsqd = %producer.addr(), "nsqd reachable");
                return;
            }
            Err(e) => {
                tracing::warn!(nsqd = %producer.addr(), error = %e, "nsqd not reachable; retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
