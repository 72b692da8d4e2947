//! NSQ producer and consumer against a scripted nsqd on loopback.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use nsqws_core::error::{NsqWsError, Result};
use nsqws_core::protocol::{Channel, Topic};
use nsqws_gateway::broker::nsq::identify;
use nsqws_gateway::broker::{MessageHandler, NsqConsumer, NsqProducer, Publisher};
use nsqws_gateway::config::ConsumerOptions;
use nsqws_gateway::obs::GatewayMetrics;

type Peer = BufReader<TcpStream>;

fn frame(frame_type: u32, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(4 + data.len() as u32).to_be_bytes());
    out.extend_from_slice(&frame_type.to_be_bytes());
    out.extend_from_slice(data);
    out
}

fn message_frame(id: &[u8; 16], attempts: u16, body: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(&1_700_000_000_000_000_000_i64.to_be_bytes());
    data.extend_from_slice(&attempts.to_be_bytes());
    data.extend_from_slice(id);
    data.extend_from_slice(body);
    frame(2, &data)
}

async fn read_line(peer: &mut Peer) -> String {
    let mut line = String::new();
    peer.read_line(&mut line).await.unwrap();
    line
}

async fn read_sized(peer: &mut Peer) -> Vec<u8> {
    let n = peer.read_u32().await.unwrap() as usize;
    let mut body = vec![0; n];
    peer.read_exact(&mut body).await.unwrap();
    body
}

async fn write(peer: &mut Peer, bytes: &[u8]) {
    peer.get_mut().write_all(bytes).await.unwrap();
}

/// Accept one client and complete magic + IDENTIFY.
async fn accept(listener: &TcpListener) -> Peer {
    let (sock, _) = listener.accept().await.unwrap();
    let mut peer = BufReader::new(sock);

    let mut magic = [0u8; 4];
    peer.read_exact(&mut magic).await.unwrap();
    assert_eq!(&magic, b"  V2");
    assert_eq!(read_line(&mut peer).await, "IDENTIFY\n");
    let body: serde_json::Value = serde_json::from_slice(&read_sized(&mut peer).await).unwrap();
    assert_eq!(body["feature_negotiation"], false);
    write(&mut peer, &frame(0, b"OK")).await;
    peer
}

#[tokio::test]
async fn producer_publishes_and_answers_heartbeats() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut peer = accept(&listener).await;
        assert_eq!(read_line(&mut peer).await, "NOP\n");

        assert_eq!(read_line(&mut peer).await, "PUB test\n");
        let body = read_sized(&mut peer).await;
        write(&mut peer, &frame(0, b"_heartbeat_")).await;
        assert_eq!(read_line(&mut peer).await, "NOP\n");
        write(&mut peer, &frame(0, b"OK")).await;
        body
    });

    let producer = NsqProducer::new(addr.to_string(), identify(&ConsumerOptions::default()), 1 << 20);
    producer.ping().await.unwrap();
    producer
        .publish(&Topic::new("test").unwrap(), Bytes::from_static(b"payload"))
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), b"payload");
}

#[tokio::test]
async fn producer_reports_error_frame_and_redials_after_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        assert_eq!(read_line(&mut first).await, "PUB test\n");
        read_sized(&mut first).await;
        write(&mut first, &frame(1, b"E_BAD_MESSAGE PUB failed")).await;
        drop(first);

        let mut second = accept(&listener).await;
        assert_eq!(read_line(&mut second).await, "PUB test\n");
        let body = read_sized(&mut second).await;
        write(&mut second, &frame(0, b"OK")).await;
        body
    });

    let producer = NsqProducer::new(addr.to_string(), identify(&ConsumerOptions::default()), 1 << 20);
    let topic = Topic::new("test").unwrap();

    let err = producer.publish(&topic, Bytes::from_static(b"one")).await.unwrap_err();
    assert_eq!(err.code().as_str(), "PUBLISH");
    assert!(err.to_string().contains("E_BAD_MESSAGE"));
    producer.publish(&topic, Bytes::from_static(b"two")).await.unwrap();

    assert_eq!(server.await.unwrap(), b"two");
}

#[tokio::test]
async fn producer_answers_idle_heartbeats_and_survives_idle_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (closed_tx, closed_rx) = tokio::sync::oneshot::channel();

    let server = tokio::spawn(async move {
        let mut first = accept(&listener).await;
        assert_eq!(read_line(&mut first).await, "NOP\n");

        // Nobody is publishing; the heartbeats still need answers.
        for _ in 0..2 {
            write(&mut first, &frame(0, b"_heartbeat_")).await;
            assert_eq!(read_line(&mut first).await, "NOP\n");
        }
        drop(first);
        closed_tx.send(()).unwrap();

        let mut second = accept(&listener).await;
        assert_eq!(read_line(&mut second).await, "PUB test\n");
        let body = read_sized(&mut second).await;
        write(&mut second, &frame(0, b"OK")).await;
        body
    });

    let producer = NsqProducer::new(addr.to_string(), identify(&ConsumerOptions::default()), 1 << 20);
    producer.ping().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("heartbeats were not answered")
        .unwrap();

    producer
        .publish(&Topic::new("test").unwrap(), Bytes::from_static(b"after idle"))
        .await
        .unwrap();

    assert_eq!(server.await.unwrap(), b"after idle");
}

#[tokio::test]
async fn producer_reports_unreachable_nsqd() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let producer = NsqProducer::new(addr.to_string(), identify(&ConsumerOptions::default()), 1 << 20);
    assert!(producer.ping().await.is_err());
}

/// Records bodies; refuses any body equal to `fail`.
struct Recorder {
    seen: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle_message(&self, body: Bytes) -> Result<()> {
        let _ = self.seen.send(body.clone());
        if body.as_ref() == b"fail" {
            return Err(NsqWsError::HubOverloaded);
        }
        Ok(())
    }
}

#[tokio::test]
async fn consumer_finishes_requeues_and_discards() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut peer = accept(&listener).await;
        assert_eq!(read_line(&mut peer).await, "SUB test client000007#ephemeral\n");
        write(&mut peer, &frame(0, b"OK")).await;
        assert_eq!(read_line(&mut peer).await, "RDY 2\n");

        write(&mut peer, &frame(0, b"_heartbeat_")).await;
        assert_eq!(read_line(&mut peer).await, "NOP\n");

        write(&mut peer, &message_frame(b"0123456789abcdef", 1, b"hi")).await;
        assert_eq!(read_line(&mut peer).await, "FIN 0123456789abcdef\n");

        write(&mut peer, &message_frame(b"fedcba9876543210", 2, b"fail")).await;
        assert_eq!(read_line(&mut peer).await, "REQ fedcba9876543210 1000\n");

        write(&mut peer, &message_frame(b"aaaaaaaaaaaaaaaa", 6, b"stale")).await;
        assert_eq!(read_line(&mut peer).await, "FIN aaaaaaaaaaaaaaaa\n");
        peer
    });

    let opts = ConsumerOptions {
        max_in_flight: 2,
        max_attempts: 5,
        requeue_delay_ms: 500,
        max_requeue_delay_ms: 60_000,
        ..ConsumerOptions::default()
    };
    let metrics = Arc::new(GatewayMetrics::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let consumer = Arc::new(NsqConsumer::new(
        Topic::new("test").unwrap(),
        Channel::ephemeral(7),
        opts,
        Arc::new(Recorder { seen: tx }),
        Arc::clone(&metrics),
    ));
    let tasks = consumer.connect_to_nsqds(&[addr.to_string()]);

    let _peer = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("fake nsqd script timed out")
        .unwrap();

    assert_eq!(rx.recv().await, Some(Bytes::from_static(b"hi")));
    assert_eq!(rx.recv().await, Some(Bytes::from_static(b"fail")));
    assert!(rx.try_recv().is_err());

    assert_eq!(metrics.nsq_messages.get(&[("result", "fin")]), 1);
    assert_eq!(metrics.nsq_messages.get(&[("result", "req")]), 1);
    assert_eq!(metrics.nsq_messages.get(&[("result", "discarded")]), 1);

    for t in tasks {
        t.abort();
    }
}
