//! WebSocket frame <-> payload mapping.
//!
//! - Text/Binary frames => opaque payload bytes
//! - Ping/Pong are transport housekeeping (the socket answers pings itself)
//! - Close is classified as normal or abnormal for logging

use axum::extract::ws::{close_code, Message};
use bytes::Bytes;

#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Payload(Bytes),
    Control,
    Close(CloseKind),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseKind {
    Normal,
    Abnormal(String),
}

impl CloseKind {
    pub fn label(&self) -> &'static str {
        match self {
            CloseKind::Normal => "normal",
            CloseKind::Abnormal(_) => "abnormal",
        }
    }
}

pub fn decode(msg: Message) -> Inbound {
    match msg {
        Message::Text(s) => Inbound::Payload(Bytes::from(s)),
        Message::Binary(b) => Inbound::Payload(Bytes::from(b)),
        Message::Ping(_) | Message::Pong(_) => Inbound::Control,
        Message::Close(None) => Inbound::Close(CloseKind::Normal),
        Message::Close(Some(frame)) => match frame.code {
            close_code::NORMAL | close_code::AWAY => Inbound::Close(CloseKind::Normal),
            code => Inbound::Close(CloseKind::Abnormal(format!(
                "close code {code}: {}",
                frame.reason
            ))),
        },
    }
}

/// Text when the payload is UTF-8, Binary otherwise.
pub fn encode(payload: &Bytes) -> Message {
    match std::str::from_utf8(payload) {
        Ok(s) => Message::Text(s.to_owned()),
        Err(_) => Message::Binary(payload.to_vec()),
    }
}
