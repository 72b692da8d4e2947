use std::net::SocketAddr;

use serde::Deserialize;
use nsqws_core::error::{NsqWsError, Result};
use nsqws_core::protocol::{Channel, Topic};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub broker: BrokerSection,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            broker: BrokerSection::default(),
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(NsqWsError::BadRequest(format!(
                "unsupported config version {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.broker.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Landing page served at `/`.
    #[serde(default = "default_home_page")]
    pub home_page: String,

    /// Per-connection outbound queue capacity.
    #[serde(default = "default_send_queue")]
    pub send_queue: usize,

    /// Hub inbox capacity.
    #[serde(default = "default_hub_inbox")]
    pub hub_inbox: usize,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            home_page: default_home_page(),
            send_queue: default_send_queue(),
            hub_inbox: default_hub_inbox(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if self.send_queue == 0 {
            return Err(NsqWsError::BadRequest("gateway.send_queue must be >= 1".into()));
        }
        if self.hub_inbox == 0 {
            return Err(NsqWsError::BadRequest("gateway.hub_inbox must be >= 1".into()));
        }
        if self.max_message_bytes == 0 {
            return Err(NsqWsError::BadRequest(
                "gateway.max_message_bytes must be >= 1".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            NsqWsError::BadRequest(format!("gateway.listen {:?} is not a socket address: {e}", self.listen))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_home_page() -> String {
    "home.html".into()
}
fn default_send_queue() -> usize {
    256
}
fn default_hub_inbox() -> usize {
    256
}
fn default_max_message_bytes() -> usize {
    64 * 1024
}

/// Which messaging backend carries the topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Nsq,
    /// In-process topic; useful for a single instance without nsqd.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default = "default_kind")]
    pub kind: BrokerKind,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// `None` picks a random ephemeral channel at startup.
    #[serde(default)]
    pub channel: Option<String>,

    /// nsqd used for publishing.
    #[serde(default = "default_nsqd_tcp_address")]
    pub nsqd_tcp_address: String,

    #[serde(default = "default_lookupd_http_addresses")]
    pub lookupd_http_addresses: Vec<String>,

    /// nsqd instances consumed directly, bypassing lookupd.
    #[serde(default)]
    pub nsqd_tcp_addresses: Vec<String>,

    #[serde(default)]
    pub consumer: ConsumerOptions,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            topic: default_topic(),
            channel: None,
            nsqd_tcp_address: default_nsqd_tcp_address(),
            lookupd_http_addresses: default_lookupd_http_addresses(),
            nsqd_tcp_addresses: Vec::new(),
            consumer: ConsumerOptions::default(),
        }
    }
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        self.topic()?;
        if let Some(ch) = &self.channel {
            Channel::new(ch.clone())?;
        }
        if self.kind == BrokerKind::Nsq {
            if self.nsqd_tcp_address.is_empty() {
                return Err(NsqWsError::BadRequest(
                    "broker.nsqd_tcp_address must be set".into(),
                ));
            }
            if self.lookupd_http_addresses.is_empty() && self.nsqd_tcp_addresses.is_empty() {
                return Err(NsqWsError::BadRequest(
                    "broker needs lookupd_http_addresses or nsqd_tcp_addresses".into(),
                ));
            }
        }
        self.consumer.validate()
    }

    pub fn topic(&self) -> Result<Topic> {
        Topic::new(self.topic.clone())
    }

    /// Configured channel, or a fresh ephemeral one.
    pub fn channel(&self) -> Result<Channel> {
        match &self.channel {
            Some(ch) => Channel::new(ch.clone()),
            None => Ok(Channel::ephemeral(rand::random::<u32>())),
        }
    }
}

fn default_kind() -> BrokerKind {
    BrokerKind::Nsq
}
fn default_topic() -> String {
    "test".into()
}
fn default_nsqd_tcp_address() -> String {
    "127.0.0.1:4150".into()
}
fn default_lookupd_http_addresses() -> Vec<String> {
    vec!["127.0.0.1:4161".into()]
}

/// Consumer tuning (`--consumer-opt key=value`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConsumerOptions {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u16,

    #[serde(default = "default_requeue_delay_ms")]
    pub requeue_delay_ms: u64,

    #[serde(default = "default_max_requeue_delay_ms")]
    pub max_requeue_delay_ms: u64,

    #[serde(default = "default_lookupd_poll_interval_ms")]
    pub lookupd_poll_interval_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_attempts: default_max_attempts(),
            requeue_delay_ms: default_requeue_delay_ms(),
            max_requeue_delay_ms: default_max_requeue_delay_ms(),
            lookupd_poll_interval_ms: default_lookupd_poll_interval_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ConsumerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(NsqWsError::BadRequest(
                "consumer.max_in_flight must be >= 1".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(NsqWsError::BadRequest(
                "consumer.max_attempts must be >= 1".into(),
            ));
        }
        if !(1000..=60000).contains(&self.heartbeat_interval_ms) {
            return Err(NsqWsError::BadRequest(
                "consumer.heartbeat_interval_ms must be between 1000 and 60000".into(),
            ));
        }
        if self.lookupd_poll_interval_ms < 1000 {
            return Err(NsqWsError::BadRequest(
                "consumer.lookupd_poll_interval_ms must be >= 1000".into(),
            ));
        }
        if self.max_requeue_delay_ms < self.requeue_delay_ms {
            return Err(NsqWsError::BadRequest(
                "consumer.max_requeue_delay_ms must be >= requeue_delay_ms".into(),
            ));
        }
        if self.max_frame_bytes < 1024 {
            return Err(NsqWsError::BadRequest(
                "consumer.max_frame_bytes must be >= 1024".into(),
            ));
        }
        Ok(())
    }

    /// Apply one `key=value` override.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        fn num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| {
                NsqWsError::BadRequest(format!("consumer option {key}: {value:?} is not a number"))
            })
        }

        match key {
            "max_in_flight" => self.max_in_flight = num(key, value)?,
            "max_attempts" => self.max_attempts = num(key, value)?,
            "requeue_delay_ms" => self.requeue_delay_ms = num(key, value)?,
            "max_requeue_delay_ms" => self.max_requeue_delay_ms = num(key, value)?,
            "lookupd_poll_interval_ms" => self.lookupd_poll_interval_ms = num(key, value)?,
            "heartbeat_interval_ms" => self.heartbeat_interval_ms = num(key, value)?,
            "reconnect_delay_ms" => self.reconnect_delay_ms = num(key, value)?,
            "max_frame_bytes" => self.max_frame_bytes = num(key, value)?,
            other => {
                return Err(NsqWsError::BadRequest(format!("unknown consumer option {other}")))
            }
        }
        Ok(())
    }
}

fn default_max_in_flight() -> u32 {
    16
}
fn default_max_attempts() -> u16 {
    5
}
fn default_requeue_delay_ms() -> u64 {
    1000
}
fn default_max_requeue_delay_ms() -> u64 {
    60_000
}
fn default_lookupd_poll_interval_ms() -> u64 {
    60_000
}
fn default_heartbeat_interval_ms() -> u64 {
    30_000
}
fn default_reconnect_delay_ms() -> u64 {
    1000
}
fn default_max_frame_bytes() -> usize {
    1024 * 1024
}
