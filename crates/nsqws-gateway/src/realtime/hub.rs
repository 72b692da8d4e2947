//! Connection hub: single-owner registry and broadcast engine.
//!
//! The registry lives inside one tokio task and is reached only through a
//! bounded inbox of [`HubCommand`]s. Commands run one at a time, to
//! completion, in arrival order, so register, unregister, and broadcast never
//! interleave and no lock guards the registry.
//!
//! Broadcast makes exactly one non-blocking enqueue attempt per connection.
//! A connection whose queue is full (or whose writer is gone) is evicted in
//! the same step: removed from the registry, which drops the only queue
//! sender and thereby closes the queue.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use nsqws_core::error::{NsqWsError, Result};

use crate::obs::GatewayMetrics;
use crate::realtime::connection::{Connection, ConnectionId, Offer};

/// Requests accepted by the hub loop.
#[derive(Debug)]
pub enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
    Broadcast(Bytes),
    /// Number of registered connections at this point in the command order.
    Count(oneshot::Sender<usize>),
}

/// Cloneable handle to a running hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    pub async fn register(&self, conn: Connection) -> Result<()> {
        self.send(HubCommand::Register(conn)).await
    }

    /// Remove a connection and close its queue. Unknown ids are a logged no-op.
    pub async fn unregister(&self, id: ConnectionId) -> Result<()> {
        self.send(HubCommand::Unregister(id)).await
    }

    /// Fan out to every registered connection, waiting for inbox space.
    pub async fn broadcast(&self, msg: Bytes) -> Result<()> {
        self.send(HubCommand::Broadcast(msg)).await
    }

    /// Fan out without waiting; a full inbox is reported as `HubOverloaded`.
    pub fn try_broadcast(&self, msg: Bytes) -> Result<()> {
        self.tx
            .try_send(HubCommand::Broadcast(msg))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => NsqWsError::HubOverloaded,
                mpsc::error::TrySendError::Closed(_) => NsqWsError::HubClosed,
            })
    }

    pub async fn connection_count(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Count(tx)).await?;
        rx.await.map_err(|_| NsqWsError::HubClosed)
    }

    async fn send(&self, cmd: HubCommand) -> Result<()> {
        self.tx.send(cmd).await.map_err(|_| NsqWsError::HubClosed)
    }
}

/// Hub state; owned by its control loop.
pub struct Hub {
    clients: HashMap<ConnectionId, Connection>,
    inbox: mpsc::Receiver<HubCommand>,
    metrics: Arc<GatewayMetrics>,
}

impl Hub {
    /// Start the control loop. It stops once every [`HubHandle`] is dropped,
    /// closing the queues of any connections still registered.
    pub fn spawn(inbox_capacity: usize, metrics: Arc<GatewayMetrics>) -> (HubHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(inbox_capacity.max(1));
        let hub = Hub {
            clients: HashMap::new(),
            inbox,
            metrics,
        };
        let task = tokio::spawn(hub.run());
        (HubHandle { tx }, task)
    }

    async fn run(mut self) {
        tracing::debug!("hub started");
        while let Some(cmd) = self.inbox.recv().await {
            self.apply(cmd);
        }
        tracing::info!(remaining = self.clients.len(), "hub stopped");
    }

    fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(conn) => self.register(conn),
            HubCommand::Unregister(id) => self.unregister(id),
            HubCommand::Broadcast(msg) => self.broadcast(&msg),
            HubCommand::Count(reply) => {
                let _ = reply.send(self.clients.len());
            }
        }
        self.metrics.connections_active.set(self.clients.len() as i64);
    }

    fn register(&mut self, conn: Connection) {
        tracing::debug!(conn = %conn.id(), addr = %conn.addr(), "register");
        self.clients.insert(conn.id(), conn);
    }

    fn unregister(&mut self, id: ConnectionId) {
        match self.clients.remove(&id) {
            Some(conn) => tracing::debug!(conn = %id, addr = %conn.addr(), "unregister"),
            None => tracing::debug!(conn = %id, "connection doesn't exist anymore"),
        }
    }

    fn broadcast(&mut self, msg: &Bytes) {
        self.metrics.hub_broadcasts.inc();
        let metrics = &self.metrics;

        self.clients.retain(|id, conn| match conn.offer(msg) {
            Offer::Queued => true,
            Offer::Full => {
                tracing::warn!(conn = %id, addr = %conn.addr(), "outbound queue full; evicting");
                metrics.evictions.inc();
                false
            }
            Offer::Gone => {
                tracing::debug!(conn = %id, addr = %conn.addr(), "writer gone; evicting");
                false
            }
        });
    }
}
