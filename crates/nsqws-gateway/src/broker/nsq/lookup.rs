//! nsqlookupd discovery over HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use nsqws_core::error::{NsqWsError, Result};
use nsqws_core::protocol::Topic;

#[derive(Debug, Deserialize)]
struct Producer {
    broadcast_address: String,
    tcp_port: u16,
}

#[derive(Debug, Deserialize)]
struct Producers {
    #[serde(default)]
    producers: Vec<Producer>,
}

/// Pre-1.0 lookupd wraps the payload in `data`; current versions do not.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LookupResponse {
    Wrapped { data: Producers },
    Plain(Producers),
}

/// Extract `host:port` nsqd TCP addresses from a `/lookup` body.
pub fn parse_lookup(body: &[u8]) -> Result<Vec<String>> {
    let resp: LookupResponse = serde_json::from_slice(body)
        .map_err(|e| NsqWsError::Protocol(format!("invalid lookup response: {e}")))?;
    let producers = match resp {
        LookupResponse::Wrapped { data } => data.producers,
        LookupResponse::Plain(p) => p.producers,
    };

    Ok(producers
        .into_iter()
        .map(|p| {
            if p.broadcast_address.contains(':') {
                format!("[{}]:{}", p.broadcast_address, p.tcp_port)
            } else {
                format!("{}:{}", p.broadcast_address, p.tcp_port)
            }
        })
        .collect())
}

#[derive(Clone)]
pub struct Lookupd {
    client: Client,
}

impl Lookupd {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| NsqWsError::Internal(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// nsqd instances carrying `topic`; an unknown topic yields none.
    pub async fn lookup(&self, lookupd: &str, topic: &Topic) -> Result<Vec<String>> {
        let base = if lookupd.starts_with("http://") || lookupd.starts_with("https://") {
            lookupd.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", lookupd.trim_end_matches('/'))
        };

        let resp = self
            .client
            .get(format!("{base}/lookup"))
            .query(&[("topic", topic.as_str())])
            .header("Accept", "application/vnd.nsq; version=1.0")
            .send()
            .await
            .map_err(|e| NsqWsError::Protocol(format!("lookupd {base}: {e}")))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(NsqWsError::Protocol(format!(
                "lookupd {base}: status {}",
                resp.status()
            )));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| NsqWsError::Protocol(format!("lookupd {base}: {e}")))?;
        parse_lookup(&body)
    }
}
