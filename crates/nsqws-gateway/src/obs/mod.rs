//! Lightweight in-process metrics.
//!
//! Counters and gauges are plain atomics updated on the hot paths and rendered
//! in Prometheus text format by the `/metrics` handler.

pub mod metrics;

pub use metrics::GatewayMetrics;
