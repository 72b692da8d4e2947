//! Gateway config loader (strict parsing) and command-line overrides.

pub mod cli;
pub mod schema;

use std::fs;
use std::path::Path;

use nsqws_core::error::{NsqWsError, Result};

pub use cli::Args;
pub use schema::{BrokerKind, BrokerSection, ConsumerOptions, GatewayConfig, GatewaySection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<GatewayConfig> {
    let path = path.as_ref();
    let s = fs::read_to_string(path)
        .map_err(|e| NsqWsError::BadRequest(format!("read config {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| NsqWsError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
