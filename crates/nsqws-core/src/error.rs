//! Shared error type across nsqws crates.

use thiserror::Error;

/// Stable error codes used in logs and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Invalid input / malformed configuration value.
    BadRequest,
    /// Topic or channel name rejected by NSQ naming rules.
    InvalidName,
    /// Malformed or unexpected bytes on the NSQ connection.
    Protocol,
    /// nsqd answered with an error frame.
    Nsq,
    /// Socket or file I/O failure.
    Io,
    /// Hub inbox is full; the caller should retry later.
    HubOverloaded,
    /// Hub control loop is gone.
    HubClosed,
    /// Publishing to the topic failed.
    Publish,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::InvalidName => "INVALID_NAME",
            ErrorCode::Protocol => "PROTOCOL",
            ErrorCode::Nsq => "NSQ",
            ErrorCode::Io => "IO",
            ErrorCode::HubOverloaded => "HUB_OVERLOADED",
            ErrorCode::HubClosed => "HUB_CLOSED",
            ErrorCode::Publish => "PUBLISH",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, NsqWsError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum NsqWsError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("nsqd error: {0}")]
    Nsq(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("hub overloaded")]
    HubOverloaded,
    #[error("hub closed")]
    HubClosed,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl NsqWsError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            NsqWsError::BadRequest(_) => ErrorCode::BadRequest,
            NsqWsError::InvalidName { .. } => ErrorCode::InvalidName,
            NsqWsError::Protocol(_) => ErrorCode::Protocol,
            NsqWsError::Nsq(_) => ErrorCode::Nsq,
            NsqWsError::Io(_) => ErrorCode::Io,
            NsqWsError::HubOverloaded => ErrorCode::HubOverloaded,
            NsqWsError::HubClosed => ErrorCode::HubClosed,
            NsqWsError::Publish(_) => ErrorCode::Publish,
            NsqWsError::Internal(_) => ErrorCode::Internal,
        }
    }
}
