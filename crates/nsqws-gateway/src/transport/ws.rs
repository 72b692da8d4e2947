//! WebSocket handler.
//!
//! Responsibilities:
//! - Upgrade HTTP -> WS
//! - Register the connection with the hub
//! - Writer task: outbound queue -> socket
//! - Reader (the upgrade future): socket -> outbound bridge
//!
//! The two halves share nothing but the queue. The reader always requests
//! unregister on exit, which closes the queue and releases the writer; a
//! writer that hits a socket error requests the same.

use std::net::SocketAddr;

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::Instrument;

use nsqws_core::error::NsqWsError;

use crate::app_state::AppState;
use crate::bridge::OutboundBridge;
use crate::realtime::{Connection, HubHandle, Outbox};
use crate::transport::codec::{self, CloseKind, Inbound};

/// Why a reader stopped.
#[derive(Debug)]
enum ReaderExit {
    Closed(CloseKind),
    PublishFailed(NsqWsError),
}

// --------------------
// Entry
// --------------------
pub async fn ws_upgrade(
    State(app): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Response {
    app.metrics().ws_upgrades.inc();
    ws.max_message_size(app.cfg().gateway.max_message_bytes)
        .on_upgrade(move |socket| {
            let span = tracing::info_span!("conn", %addr);
            run_session(app, addr, socket).instrument(span)
        })
}

// --------------------
// Session
// --------------------
async fn run_session(app: AppState, addr: SocketAddr, socket: WebSocket) {
    let (conn, outbox) = Connection::new(addr, app.cfg().gateway.send_queue);
    let id = conn.id();
    let hub = app.hub();

    if let Err(e) = hub.register(conn).await {
        tracing::warn!(error = %e, "cannot register connection");
        return;
    }
    tracing::debug!(conn = %id, "connected");

    let (ws_tx, ws_rx) = socket.split();
    tokio::spawn(write_loop(hub.clone(), outbox, ws_tx).in_current_span());

    let exit = read_loop(app.outbound(), ws_rx).await;
    match &exit {
        ReaderExit::Closed(CloseKind::Normal) => tracing::debug!(conn = %id, "closed"),
        ReaderExit::Closed(CloseKind::Abnormal(reason)) => {
            tracing::warn!(conn = %id, %reason, "connection error")
        }
        ReaderExit::PublishFailed(e) => {
            app.metrics().publish_failures.inc();
            tracing::warn!(conn = %id, error = %e, "publish failed; closing connection")
        }
    }
    let reason = match &exit {
        ReaderExit::Closed(kind) => kind.label(),
        ReaderExit::PublishFailed(_) => "publish_failed",
    };
    app.metrics().disconnects.inc(&[("reason", reason)]);

    if let Err(e) = hub.unregister(id).await {
        tracing::debug!(conn = %id, error = %e, "unregister after hub stop");
    }
}

async fn read_loop(outbound: &OutboundBridge, mut ws_rx: SplitStream<WebSocket>) -> ReaderExit {
    loop {
        let msg = match ws_rx.next().await {
            None => return ReaderExit::Closed(CloseKind::Normal),
            Some(Err(e)) => return ReaderExit::Closed(CloseKind::Abnormal(e.to_string())),
            Some(Ok(msg)) => msg,
        };

        match codec::decode(msg) {
            Inbound::Payload(body) => {
                if let Err(e) = outbound.forward(body).await {
                    return ReaderExit::PublishFailed(e);
                }
            }
            Inbound::Control => {}
            Inbound::Close(kind) => return ReaderExit::Closed(kind),
        }
    }
}

async fn write_loop(hub: HubHandle, mut outbox: Outbox, mut ws_tx: SplitSink<WebSocket, Message>) {
    while let Some(msg) = outbox.recv().await {
        if let Err(e) = ws_tx.send(codec::encode(&msg)).await {
            tracing::debug!(conn = %outbox.id(), error = %e, "write failed");
            let _ = hub.unregister(outbox.id()).await;
            return;
        }
    }

    // queue closed by the hub: unregistered or evicted
    let _ = ws_tx.send(Message::Close(None)).await;
}
