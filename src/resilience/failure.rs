//! Classification of dependency failures.
//!
//! Operations guarded by a breaker return an error type implementing
//! [`DependencyFailure`]. The breaker only looks at the kind, so a
//! validation error raised by the caller's own code can be excluded from
//! the count while network and upstream errors trip the circuit.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a failed dependency call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The call exceeded its deadline.
    Timeout,
    /// Could not reach the dependency.
    Connection,
    /// The dependency reported itself unavailable (e.g. HTTP 503).
    Unavailable,
    /// The dependency throttled us (e.g. HTTP 429).
    RateLimited,
    /// Upstream server error.
    Server,
    /// The dependency answered with something we could not use.
    InvalidResponse,
    /// The request was rejected as invalid.
    Validation,
    /// A bug or unexpected condition on our side.
    Internal,
}

impl FailureKind {
    pub const ALL: [FailureKind; 8] = [
        FailureKind::Timeout,
        FailureKind::Connection,
        FailureKind::Unavailable,
        FailureKind::RateLimited,
        FailureKind::Server,
        FailureKind::InvalidResponse,
        FailureKind::Validation,
        FailureKind::Internal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::Unavailable => "unavailable",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Server => "server",
            FailureKind::InvalidResponse => "invalid_response",
            FailureKind::Validation => "validation",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error that can be classified for the circuit breaker.
pub trait DependencyFailure {
    fn failure_kind(&self) -> FailureKind;
}

impl DependencyFailure for FailureKind {
    fn failure_kind(&self) -> FailureKind {
        *self
    }
}

impl DependencyFailure for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::AddrNotAvailable => FailureKind::Connection,
            ErrorKind::InvalidInput => FailureKind::Validation,
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => FailureKind::InvalidResponse,
            _ => FailureKind::Internal,
        }
    }
}

impl DependencyFailure for tokio::time::error::Elapsed {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Timeout
    }
}

impl DependencyFailure for reqwest::Error {
    fn failure_kind(&self) -> FailureKind {
        if self.is_timeout() {
            return FailureKind::Timeout;
        }
        if self.is_connect() {
            return FailureKind::Connection;
        }
        if self.is_decode() {
            return FailureKind::InvalidResponse;
        }
        if self.is_builder() {
            return FailureKind::Validation;
        }
        match self.status() {
            Some(status) => classify_status(status.as_u16()),
            None => FailureKind::Connection,
        }
    }
}

/// Map an HTTP status code of a failed response to a failure kind.
pub fn classify_status(status: u16) -> FailureKind {
    match status {
        408 | 504 => FailureKind::Timeout,
        429 => FailureKind::RateLimited,
        502 | 503 => FailureKind::Unavailable,
        500..=599 => FailureKind::Server,
        400..=499 => FailureKind::Validation,
        _ => FailureKind::InvalidResponse,
    }
}
