//! Publishing side: one lazily dialed nsqd connection shared by all callers.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};

use nsqws_core::error::{NsqWsError, Result};
use nsqws_core::protocol::wire::{Command, Frame, Identify};
use nsqws_core::protocol::Topic;

use super::conn::NsqConn;
use crate::broker::Publisher;

const REQUEST_QUEUE: usize = 64;

struct Request {
    cmd: Command,
    reply: Option<oneshot::Sender<Result<()>>>,
}

/// Publishes to a single nsqd.
///
/// Each connection is owned by a router task that writes commands in order,
/// answers heartbeats while idle, and hands every `OK`/`E_*` response to the
/// oldest waiting caller. When the router dies the next call redials.
pub struct NsqProducer {
    addr: String,
    identify: Identify,
    max_frame_bytes: usize,
    router: Mutex<Option<mpsc::Sender<Request>>>,
}

impl NsqProducer {
    pub fn new(addr: impl Into<String>, identify: Identify, max_frame_bytes: usize) -> Self {
        Self {
            addr: addr.into(),
            identify,
            max_frame_bytes,
            router: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Make sure nsqd is reachable (dial if needed, then `NOP`).
    pub async fn ping(&self) -> Result<()> {
        let (tx, _) = self.connected().await?;
        tx.send(Request {
            cmd: Command::Nop,
            reply: None,
        })
        .await
        .map_err(|_| connection_closed())
    }

    /// Live router, dialing a new connection if there is none. The flag is
    /// true when this call did the dialing.
    async fn connected(&self) -> Result<(mpsc::Sender<Request>, bool)> {
        let mut slot = self.router.lock().await;
        if let Some(tx) = slot.as_ref().filter(|tx| !tx.is_closed()) {
            return Ok((tx.clone(), false));
        }
        *slot = None;

        let conn = NsqConn::connect(&self.addr, &self.identify, self.max_frame_bytes).await?;
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
        tokio::spawn(route(conn, rx));
        *slot = Some(tx.clone());
        Ok((tx, true))
    }

    async fn request(&self, cmd: Command) -> (Result<()>, bool) {
        let (tx, fresh) = match self.connected().await {
            Ok(found) => found,
            Err(e) => return (Err(e), true),
        };
        let (reply, response) = oneshot::channel();
        if tx.send(Request { cmd, reply: Some(reply) }).await.is_err() {
            return (Err(connection_closed()), fresh);
        }
        let res = response.await.unwrap_or_else(|_| Err(connection_closed()));
        (res, fresh)
    }
}

#[async_trait]
impl Publisher for NsqProducer {
    async fn publish(&self, topic: &Topic, body: Bytes) -> Result<()> {
        let cmd = Command::Pub {
            topic: topic.clone(),
            body,
        };

        // A connection nsqd dropped while we were idle gets one redial.
        let res = match self.request(cmd.clone()).await {
            (Err(NsqWsError::Io(e)), false) => {
                tracing::debug!(nsqd = %self.addr, error = %e, "connection went away; redialing");
                self.request(cmd).await.0
            }
            (res, _) => res,
        };

        res.map_err(|e| {
            tracing::debug!(nsqd = %self.addr, error = %e, "publish failed");
            NsqWsError::Publish(e.to_string())
        })
    }
}

fn connection_closed() -> NsqWsError {
    NsqWsError::Io(std::io::ErrorKind::ConnectionAborted.into())
}

fn answer(pending: &mut VecDeque<oneshot::Sender<Result<()>>>, res: Result<()>) {
    match pending.pop_front() {
        Some(reply) => {
            let _ = reply.send(res);
        }
        None => tracing::debug!("response with no waiting publisher"),
    }
}

async fn route(mut conn: NsqConn, mut requests: mpsc::Receiver<Request>) {
    let mut pending = VecDeque::new();

    let err = loop {
        tokio::select! {
            req = requests.recv() => {
                let Some(req) = req else {
                    tracing::debug!(nsqd = %conn.addr(), "producer dropped; closing connection");
                    return;
                };
                if let Some(reply) = req.reply {
                    pending.push_back(reply);
                }
                if let Err(e) = conn.send(&req.cmd).await {
                    break e;
                }
            }
            frame = conn.read_frame() => match frame {
                Ok(f) if f.is_heartbeat() => {
                    if let Err(e) = conn.send(&Command::Nop).await {
                        break e;
                    }
                }
                Ok(f) if f.is_ok() => answer(&mut pending, Ok(())),
                Ok(Frame::Error(body)) => answer(
                    &mut pending,
                    Err(NsqWsError::Nsq(String::from_utf8_lossy(&body).into_owned())),
                ),
                Ok(other) => {
                    break NsqWsError::Protocol(format!("unexpected frame on producer connection: {other:?}"))
                }
                Err(e) => break e,
            },
        }
    };

    tracing::debug!(nsqd = %conn.addr(), error = %err, "producer connection closed");
    requests.close();
    for reply in pending.drain(..) {
        let _ = reply.send(Err(connection_closed()));
    }
    while let Some(req) = requests.recv().await {
        if let Some(reply) = req.reply {
            let _ = reply.send(Err(connection_closed()));
        }
    }
}
