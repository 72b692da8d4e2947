//! Hub registry and fan-out behaviour.
//!
//! Every command goes through one FIFO inbox, so once `connection_count()`
//! answers, all commands sent before it by this task have been applied and
//! the outboxes can be inspected with `try_recv`.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::TryRecvError;

use nsqws_gateway::obs::GatewayMetrics;
use nsqws_gateway::realtime::{Connection, Hub, HubHandle, Outbox};

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn spawn_hub() -> (HubHandle, Arc<GatewayMetrics>) {
    let metrics = Arc::new(GatewayMetrics::default());
    let (hub, _task) = Hub::spawn(64, Arc::clone(&metrics));
    (hub, metrics)
}

fn msg(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}

/// Everything currently queued, plus whether the queue is closed.
fn drain(outbox: &mut Outbox) -> (Vec<Bytes>, bool) {
    let mut got = Vec::new();
    loop {
        match outbox.try_recv() {
            Ok(m) => got.push(m),
            Err(e) => return (got, e == TryRecvError::Disconnected),
        }
    }
}

#[tokio::test]
async fn register_broadcast_evict_unregister_scenario() {
    let (hub, metrics) = spawn_hub();
    let (c1, mut o1) = Connection::new(addr(1), 1);
    let (c2, mut o2) = Connection::new(addr(2), 8);
    let (id1, id2) = (c1.id(), c2.id());
    hub.register(c1).await.unwrap();
    hub.register(c2).await.unwrap();

    hub.broadcast(msg("m1")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 2);
    assert_eq!(drain(&mut o2), (vec![msg("m1")], false));

    // c1 still holds m1 undrained: its queue is at capacity.
    hub.broadcast(msg("m2")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 1);
    assert_eq!(drain(&mut o1), (vec![msg("m1")], true));
    assert_eq!(drain(&mut o2), (vec![msg("m2")], false));
    assert_eq!(metrics.evictions.get(), 1);

    hub.unregister(id2).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 0);
    assert_eq!(drain(&mut o2), (vec![], true));

    hub.broadcast(msg("m3")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 0);
    assert_eq!(drain(&mut o1), (vec![], true));
    assert_eq!(drain(&mut o2), (vec![], true));

    // already gone: tolerated no-op
    hub.unregister(id1).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn only_registered_connections_receive() {
    let (hub, _) = spawn_hub();
    let (a, mut oa) = Connection::new(addr(1), 8);
    let (b, mut ob) = Connection::new(addr(2), 8);
    let (late, mut olate) = Connection::new(addr(3), 8);
    let a_id = a.id();

    hub.register(a).await.unwrap();
    hub.register(b).await.unwrap();
    hub.broadcast(msg("before")).await.unwrap();
    hub.unregister(a_id).await.unwrap();
    hub.register(late).await.unwrap();
    hub.broadcast(msg("after")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 2);

    assert_eq!(drain(&mut oa), (vec![msg("before")], true));
    assert_eq!(drain(&mut ob), (vec![msg("before"), msg("after")], false));
    assert_eq!(drain(&mut olate), (vec![msg("after")], false));
}

#[tokio::test]
async fn concurrent_unregister_and_eviction_close_once() {
    let (hub, _) = spawn_hub();
    let (slow, mut oslow) = Connection::new(addr(1), 1);
    let (steady, mut osteady) = Connection::new(addr(2), 8);
    let slow_id = slow.id();
    hub.register(slow).await.unwrap();
    hub.register(steady).await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                hub.unregister(slow_id).await.unwrap();
            } else {
                hub.broadcast(Bytes::from(format!("x{i}"))).await.unwrap();
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(hub.connection_count().await.unwrap(), 1);
    let (got, closed) = drain(&mut oslow);
    assert!(closed);
    assert!(got.len() <= 1);

    let (steady_got, steady_closed) = drain(&mut osteady);
    assert_eq!(steady_got.len(), 4);
    assert!(!steady_closed);
}

#[tokio::test]
async fn slow_connection_does_not_affect_others() {
    let (hub, metrics) = spawn_hub();
    let (stuck, _ostuck) = Connection::new(addr(1), 1);
    let (fast, mut ofast) = Connection::new(addr(2), 128);
    hub.register(stuck).await.unwrap();
    hub.register(fast).await.unwrap();

    let sent: Vec<Bytes> = (0..50).map(|i| Bytes::from(format!("n{i}"))).collect();
    for m in &sent {
        hub.broadcast(m.clone()).await.unwrap();
    }
    assert_eq!(hub.connection_count().await.unwrap(), 1);
    assert_eq!(metrics.evictions.get(), 1);
    assert_eq!(drain(&mut ofast), (sent, false));
}

#[tokio::test]
async fn delivery_order_matches_broadcast_order() {
    let (hub, _) = spawn_hub();
    let (c, mut out) = Connection::new(addr(1), 32);
    let id = c.id();

    hub.broadcast(msg("not-yet")).await.unwrap();
    hub.register(c).await.unwrap();
    let expected: Vec<Bytes> = (0..10).map(|i| Bytes::from(format!("m{i}"))).collect();
    for m in &expected {
        hub.broadcast(m.clone()).await.unwrap();
    }
    hub.unregister(id).await.unwrap();
    hub.broadcast(msg("too-late")).await.unwrap();
    hub.connection_count().await.unwrap();

    let mut got = Vec::new();
    while let Some(m) = out.recv().await {
        got.push(m);
    }
    assert_eq!(got, expected);
}

#[tokio::test]
async fn full_queue_is_evicted_before_next_broadcast() {
    let (hub, _) = spawn_hub();
    let (c, mut out) = Connection::new(addr(1), 2);
    hub.register(c).await.unwrap();

    hub.broadcast(msg("a")).await.unwrap();
    hub.broadcast(msg("b")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 1);

    hub.broadcast(msg("c")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 0);
    assert_eq!(drain(&mut out), (vec![msg("a"), msg("b")], true));
}

#[tokio::test]
async fn dropped_writer_is_removed_on_broadcast() {
    let (hub, _) = spawn_hub();
    let (c, out) = Connection::new(addr(1), 4);
    hub.register(c).await.unwrap();
    drop(out);

    hub.broadcast(msg("anyone?")).await.unwrap();
    assert_eq!(hub.connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn try_broadcast_reports_full_inbox() {
    // current-thread runtime: the hub task cannot run until this test yields
    let metrics = Arc::new(GatewayMetrics::default());
    let (hub, _task) = Hub::spawn(1, metrics);

    hub.try_broadcast(msg("first")).unwrap();
    let err = hub.try_broadcast(msg("second")).unwrap_err();
    assert_eq!(err.code().as_str(), "HUB_OVERLOADED");

    assert_eq!(hub.connection_count().await.unwrap(), 0);
    hub.try_broadcast(msg("third")).unwrap();
}

#[tokio::test]
async fn stopping_the_hub_closes_remaining_queues() {
    let metrics = Arc::new(GatewayMetrics::default());
    let (hub, task) = Hub::spawn(8, metrics);
    let (c, mut out) = Connection::new(addr(1), 4);
    hub.register(c).await.unwrap();
    hub.broadcast(msg("bye")).await.unwrap();

    drop(hub);
    task.await.unwrap();

    assert_eq!(out.recv().await, Some(msg("bye")));
    assert_eq!(out.recv().await, None);
}
