//! Error type shared by both transports and the dispatcher.
//!
//! # Design
//! Each failure kind is its own variant with its own payload so callers can
//! match on the kind instead of probing fields. `Timeout` and `Status` are
//! delivered through the completion channel; the remaining variants describe
//! caller contract violations and are returned synchronously from the
//! dispatcher before any I/O starts. `Cancelled` is only ever observed through
//! a `ResponseFuture` whose pending operation went away without an outcome.

use std::fmt;

/// Errors produced by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The response did not arrive within the configured timeout.
    Timeout { ms: u64 },

    /// The HTTP call completed with a status outside `[200, 300)`.
    ///
    /// Network failures surface as status `0`, the way a browser reports them.
    Status { code: u16 },

    /// No callback was supplied and the host has no future support.
    InvalidCallback,

    /// The configured method is neither `GET` nor `POST`.
    InvalidMethod(String),

    /// The options carried no URL.
    MissingUrl,

    /// The host offered neither a primary nor a fallback HTTP client.
    NoHttpClient,

    /// The pending operation was dropped before it produced an outcome.
    Cancelled,
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// The configured timeout, for `Timeout` errors.
    pub fn timeout_ms(&self) -> Option<u64> {
        match self {
            RequestError::Timeout { ms } => Some(*ms),
            _ => None,
        }
    }

    /// The HTTP status, for `Status` errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Status { code } => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Timeout { ms } => write!(f, "Timeout of {ms} reached"),
            RequestError::Status { code } => write!(f, "Invalid status code \"{code}\""),
            RequestError::InvalidCallback => write!(f, "Invalid callback obtained"),
            RequestError::InvalidMethod(method) => {
                write!(f, "unsupported method \"{method}\"")
            }
            RequestError::MissingUrl => write!(f, "no url configured"),
            RequestError::NoHttpClient => write!(f, "no HTTP client available"),
            RequestError::Cancelled => write!(f, "request cancelled"),
        }
    }
}

impl std::error::Error for RequestError {}
