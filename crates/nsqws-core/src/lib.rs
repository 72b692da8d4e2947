//! nsqws core: runtime-free NSQ primitives and the shared error type.
//!
//! This crate defines the NSQ wire contracts (names, commands, frames) and the
//! error surface shared by the gateway and its tests. It intentionally carries
//! no transport or runtime dependencies so the codec can be exercised without
//! a socket.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `NsqWsError`/`Result` so a misbehaving
//! nsqd cannot crash the bridge.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{NsqWsError, Result};
