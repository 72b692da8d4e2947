#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use tower::util::ServiceExt;

use nsqws_core::protocol::Topic;
use nsqws_gateway::app_state::AppState;
use nsqws_gateway::bridge::OutboundBridge;
use nsqws_gateway::broker::{MemoryBroker, Publisher};
use nsqws_gateway::config::{ConsumerOptions, GatewayConfig};
use nsqws_gateway::obs::GatewayMetrics;
use nsqws_gateway::realtime::Hub;
use nsqws_gateway::router::build_router;

fn app() -> axum::Router {
    let mut cfg = GatewayConfig::default();
    cfg.gateway.home_page = concat!(env!("CARGO_MANIFEST_DIR"), "/../../home.html").to_string();

    let metrics = Arc::new(GatewayMetrics::default());
    let (hub, _task) = Hub::spawn(8, Arc::clone(&metrics));
    let broker: Arc<dyn Publisher> = Arc::new(MemoryBroker::new(ConsumerOptions::default()));
    let outbound = OutboundBridge::new(broker, Topic::new("test").unwrap());

    build_router(AppState::new(cfg, hub, outbound, metrics))
}

async fn call(method: Method, uri: &str) -> StatusCode {
    app()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn serves_home_page() {
    assert_eq!(call(Method::GET, "/").await, StatusCode::OK);
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    assert_eq!(call(Method::GET, "/nope").await, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn home_rejects_other_methods() {
    assert_eq!(call(Method::POST, "/").await, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn exposes_metrics() {
    let resp = app()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("nsqws_connections_active"));
}
