//! Adapters between the hub and the messaging system.
//!
//! - `inbound`: topic delivery -> hub broadcast.
//! - `outbound`: client message -> topic publish.

pub mod inbound;
pub mod outbound;

pub use inbound::InboundBridge;
pub use outbound::OutboundBridge;
