//! NSQ client: a publishing producer and a lookupd-driven consumer.

mod conn;
pub mod consumer;
pub mod lookup;
pub mod producer;

pub use consumer::NsqConsumer;
pub use producer::NsqProducer;

use nsqws_core::protocol::wire::Identify;

use crate::config::ConsumerOptions;

/// IDENTIFY body shared by producer and consumer connections.
pub fn identify(opts: &ConsumerOptions) -> Identify {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    Identify {
        client_id: hostname.split('.').next().unwrap_or("nsqws").to_string(),
        hostname,
        user_agent: format!("nsqws/{}", env!("CARGO_PKG_VERSION")),
        heartbeat_interval: opts.heartbeat_interval_ms,
        feature_negotiation: false,
    }
}
