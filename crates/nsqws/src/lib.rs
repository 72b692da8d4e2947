//! Top-level facade crate for nsqws.
//!
//! Re-exports the NSQ primitives and the bridge gateway so users can depend on a single crate.

pub mod core {
    pub use nsqws_core::*;
}

pub mod gateway {
    pub use nsqws_gateway::*;
}
