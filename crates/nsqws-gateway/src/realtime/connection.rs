//! One live client link as seen by the hub.
//!
//! A `Connection` carries the only sender of its outbound queue; the matching
//! `Outbox` is the only receiver and belongs to the connection's writer.
//! Moving the `Connection` into the hub therefore makes the hub the queue's
//! sole producer, and dropping it there is the one and only queue close.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{
    self,
    error::{TryRecvError, TrySendError},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique connection identity, minted per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Result of a single non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// The writer is not keeping up.
    Full,
    /// The writer has already gone away.
    Gone,
}

/// Hub-side half: identity, diagnostics, and the queue sender.
pub struct Connection {
    id: ConnectionId,
    addr: SocketAddr,
    tx: mpsc::Sender<Bytes>,
}

/// Writer-side half: the queue receiver.
pub struct Outbox {
    id: ConnectionId,
    rx: mpsc::Receiver<Bytes>,
}

impl Connection {
    /// Create a connection with a bounded outbound queue (capacity >= 1).
    pub fn new(addr: SocketAddr, capacity: usize) -> (Connection, Outbox) {
        let id = ConnectionId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Connection { id, addr, tx }, Outbox { id, rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Try to enqueue without waiting.
    pub(crate) fn offer(&self, msg: &Bytes) -> Offer {
        match self.tx.try_send(msg.clone()) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(_)) => Offer::Full,
            Err(TrySendError::Closed(_)) => Offer::Gone,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}

impl Outbox {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next queued message; `None` once the hub closed the queue and it is drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Outbox::recv`]. `Disconnected` means the
    /// queue is closed and drained.
    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        self.rx.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    #[test]
    fn ids_are_unique_per_instance() {
        let (a, _ra) = Connection::new(addr(), 1);
        let (b, _rb) = Connection::new(addr(), 1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn offer_reports_full_and_gone() {
        let (conn, outbox) = Connection::new(addr(), 1);
        let msg = Bytes::from_static(b"x");
        assert_eq!(conn.offer(&msg), Offer::Queued);
        assert_eq!(conn.offer(&msg), Offer::Full);

        drop(outbox);
        assert_eq!(conn.offer(&msg), Offer::Gone);
    }

    #[test]
    fn dropping_connection_closes_outbox() {
        let (conn, mut outbox) = Connection::new(addr(), 4);
        assert_eq!(outbox.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(conn.offer(&Bytes::from_static(b"last")), Offer::Queued);
        drop(conn);

        assert_eq!(outbox.try_recv(), Ok(Bytes::from_static(b"last")));
        assert_eq!(outbox.try_recv(), Err(TryRecvError::Disconnected));
    }
}
