//! Transport layer (WebSocket).
//!
//! Exposes the WS upgrade handler, the per-connection reader/writer, and the
//! codec mapping frames to opaque payloads.

pub mod codec;
pub mod ws;
