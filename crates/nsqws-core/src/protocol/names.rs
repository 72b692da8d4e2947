//! Topic and channel names.
//!
//! nsqd accepts 1..=64 characters of `[A-Za-z0-9._-]`, optionally followed by
//! the `#ephemeral` suffix (which counts toward the length). Names are
//! validated once at construction so the wire encoder can trust them.

use std::fmt;
use std::str::FromStr;

use crate::error::{NsqWsError, Result};

/// Longest name nsqd accepts, suffix included.
pub const MAX_NAME_LEN: usize = 64;

/// Suffix marking a topic/channel that nsqd discards once unused.
pub const EPHEMERAL_SUFFIX: &str = "#ephemeral";

fn validate(name: &str) -> Result<()> {
    let invalid = |reason| NsqWsError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(invalid("longer than 64 bytes"));
    }

    let base = name.strip_suffix(EPHEMERAL_SUFFIX).unwrap_or(name);
    if base.is_empty() {
        return Err(invalid("empty before #ephemeral"));
    }
    let ok = base
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'));
    if !ok {
        return Err(invalid("only [A-Za-z0-9._-] allowed"));
    }
    Ok(())
}

macro_rules! nsq_name {
    ($(#[$doc:meta])* $ty:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $ty(String);

        impl $ty {
            /// Validate and wrap a name.
            pub fn new(name: impl Into<String>) -> Result<Self> {
                let name = name.into();
                validate(&name)?;
                Ok(Self(name))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the name carries the `#ephemeral` suffix.
            pub fn is_ephemeral(&self) -> bool {
                self.0.ends_with(EPHEMERAL_SUFFIX)
            }
        }

        impl FromStr for $ty {
            type Err = NsqWsError;

            fn from_str(s: &str) -> Result<Self> {
                Self::new(s)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

nsq_name!(
    /// A validated NSQ topic name.
    Topic
);

nsq_name!(
    /// A validated NSQ channel name.
    Channel
);

impl Channel {
    /// Per-process ephemeral channel (`client000042#ephemeral`).
    ///
    /// Every bridge instance subscribes on its own channel so each one sees
    /// every message published on the topic.
    pub fn ephemeral(seed: u32) -> Self {
        Self(format!("client{:06}{}", seed % 1_000_000, EPHEMERAL_SUFFIX))
    }
}
