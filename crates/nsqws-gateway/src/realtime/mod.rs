//! Realtime core: live connections and the hub that fans messages out to them.

pub mod connection;
pub mod hub;

pub use connection::{Connection, ConnectionId, Outbox};
pub use hub::{Hub, HubCommand, HubHandle};
