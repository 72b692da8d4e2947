//! nsqws gateway library entry.
//!
//! This crate wires the WebSocket transport, the connection hub, the NSQ
//! (or in-process) broker, and the bridges between them into one service.
//! It is consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod bridge;
pub mod broker;
pub mod config;
pub mod obs;
pub mod realtime;
pub mod router;
pub mod transport;
