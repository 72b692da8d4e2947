use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use nsqws_core::error::Result;

use crate::broker::MessageHandler;
use crate::obs::GatewayMetrics;
use crate::realtime::HubHandle;

/// Hands each topic delivery to the hub without waiting.
///
/// A hub that cannot take the message right now is reported back to the
/// broker, which redelivers it later instead of losing it here.
pub struct InboundBridge {
    hub: HubHandle,
    metrics: Arc<GatewayMetrics>,
}

impl InboundBridge {
    pub fn new(hub: HubHandle, metrics: Arc<GatewayMetrics>) -> Self {
        Self { hub, metrics }
    }
}

#[async_trait]
impl MessageHandler for InboundBridge {
    async fn handle_message(&self, body: Bytes) -> Result<()> {
        tracing::trace!(len = body.len(), "topic message");
        self.hub.try_broadcast(body).inspect_err(|e| {
            self.metrics.inbound_rejected.inc();
            tracing::debug!(error = %e, "hub refused message");
        })
    }
}
