//! Axum router wiring.
//!
//! - `/`        landing page (GET only)
//! - `/ws`      WebSocket upgrade
//! - `/metrics` Prometheus text

use axum::{extract::State, routing::get, routing::get_service, Router};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

use crate::{app_state::AppState, transport};

pub fn build_router(state: AppState) -> Router {
    let home = ServeFile::new(&state.cfg().gateway.home_page);
    Router::new()
        .route("/", get_service(home))
        .route("/ws", get(transport::ws::ws_upgrade))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics(State(app): State<AppState>) -> String {
    app.metrics().render()
}
