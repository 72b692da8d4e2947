//! NSQ protocol modules.
//!
//! - `names`: topic/channel newtypes validated against nsqd's naming rules.
//! - `wire`: TCP protocol V2 commands, frames, and message decoding.
//!
//! All parsers are panic-free: malformed input is reported as `NsqWsError`
//! instead of panicking or indexing raw buffers.

pub mod names;
pub mod wire;

pub use names::{Channel, Topic};
