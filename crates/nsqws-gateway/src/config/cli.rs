use std::path::PathBuf;

use clap::Parser;
use nsqws_core::error::Result;

use super::schema::{BrokerKind, GatewayConfig};

/// Bridge WebSocket clients to an NSQ topic.
#[derive(Debug, Default, Parser)]
#[command(name = "nsqws-gateway", version)]
pub struct Args {
    /// YAML config file; built-in defaults are used when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HTTP service address.
    #[arg(long)]
    pub addr: Option<String>,

    /// nsqd TCP address used for publishing.
    #[arg(long)]
    pub nsqd_tcp_address: Option<String>,

    /// nsqlookupd HTTP address (may be given multiple times).
    #[arg(long = "nsqd-lookupd-http-address")]
    pub lookupd_http_addresses: Vec<String>,

    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub channel: Option<String>,

    /// Use the in-process broker instead of nsqd.
    #[arg(long)]
    pub memory_broker: bool,

    /// Consumer option passthrough, `key=value` (may be given multiple times).
    #[arg(long = "consumer-opt", value_parser = parse_key_val)]
    pub consumer_opts: Vec<(String, String)>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

impl Args {
    /// Load the config file (or defaults), apply flag overrides, validate.
    pub fn load(&self) -> Result<GatewayConfig> {
        let mut cfg = match &self.config {
            Some(path) => super::load_from_file(path)?,
            None => GatewayConfig::default(),
        };
        self.apply(&mut cfg)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&self, cfg: &mut GatewayConfig) -> Result<()> {
        if let Some(addr) = &self.addr {
            cfg.gateway.listen = normalize_listen(addr);
        }
        if let Some(nsqd) = &self.nsqd_tcp_address {
            cfg.broker.nsqd_tcp_address = nsqd.clone();
        }
        if !self.lookupd_http_addresses.is_empty() {
            cfg.broker.lookupd_http_addresses = self.lookupd_http_addresses.clone();
        }
        if let Some(topic) = &self.topic {
            cfg.broker.topic = topic.clone();
        }
        if let Some(channel) = &self.channel {
            cfg.broker.channel = Some(channel.clone());
        }
        if self.memory_broker {
            cfg.broker.kind = BrokerKind::Memory;
        }
        for (k, v) in &self.consumer_opts {
            cfg.broker.consumer.set(k, v)?;
        }
        Ok(())
    }
}

/// Accept Go-style `:8080` as "all interfaces".
fn normalize_listen(addr: &str) -> String {
    match addr.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => addr.to_string(),
    }
}
