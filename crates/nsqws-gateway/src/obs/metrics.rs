//! Minimal metrics registry for the bridge.
//!
//! Unlabelled counters and gauges are single atomics. Labelled counters are
//! backed by `DashMap` with label pairs flattened into sorted key vectors so
//! rendering order is deterministic per key.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter\n{name} {}", self.get());
    }
}

#[derive(Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    pub fn set(&self, v: i64) {
        self.0.store(v, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge\n{name} {}", self.get());
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<Vec<(String, String)>, AtomicU64>,
}

impl CounterVec {
    /// Increment by 1.
    pub fn inc(&self, labels: &[(&str, &str)]) {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();

        let counter = self.map.entry(key).or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        let mut key: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        key.sort();
        self.map
            .get(&key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            let label_str = r
                .key()
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
                .collect::<Vec<_>>()
                .join(",");
            let _ = writeln!(out, "{name}{{{label_str}}} {}", r.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct GatewayMetrics {
    pub ws_upgrades: Counter,
    pub connections_active: Gauge,
    pub hub_broadcasts: Counter,
    pub evictions: Counter,
    pub inbound_rejected: Counter,
    pub publish_failures: Counter,
    /// Reader exits by reason (`normal`, `abnormal`, `publish_failed`).
    pub disconnects: CounterVec,
    /// NSQ message outcomes (`fin`, `req`, `discarded`).
    pub nsq_messages: CounterVec,
}

impl GatewayMetrics {
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.ws_upgrades.render("nsqws_ws_upgrades_total", &mut out);
        self.connections_active.render("nsqws_connections_active", &mut out);
        self.hub_broadcasts.render("nsqws_hub_broadcasts_total", &mut out);
        self.evictions.render("nsqws_hub_evictions_total", &mut out);
        self.inbound_rejected.render("nsqws_inbound_rejected_total", &mut out);
        self.publish_failures.render("nsqws_publish_failures_total", &mut out);
        self.disconnects.render("nsqws_disconnects_total", &mut out);
        self.nsq_messages.render("nsqws_nsq_messages_total", &mut out);
        out
    }
}
