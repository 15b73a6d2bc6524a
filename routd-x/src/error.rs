//! Tagged error values with three visibility kinds.
//!
//! Every error that crosses a protocol boundary is one of:
//! - `Silent`: internal diagnostics, never surfaced to clients.
//! - `Openly`: carries a code and a message that both go to the client.
//! - `Closed`: carries a code and a message for the server log only; the
//!   client sees a generic service-unavailable response.

use thiserror::Error;

/// Generic code+message reported to clients for non-openly errors.
pub const SERVICE_UNAVAILABLE: i32 = 503;
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "Service Unavailable";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Internal error, logged at debug level and never sent to clients.
    #[error("{0}")]
    Silent(String),

    /// User-visible error: the adapter sends `code` and `message` out.
    #[error("[openly {code}] {message}")]
    Openly { code: i32, message: String },

    /// Server-side error: the message must not leak; clients get a
    /// generic service-unavailable response instead.
    #[error("[closed {code}] {message}")]
    Closed { code: i32, message: String },
}

impl Error {
    pub fn silent(message: impl Into<String>) -> Self {
        Error::Silent(message.into())
    }

    pub fn openly(code: i32, message: impl Into<String>) -> Self {
        Error::Openly { code, message: message.into() }
    }

    pub fn openly0(message: impl Into<String>) -> Self {
        Self::openly(0, message)
    }

    pub fn closed(code: i32, message: impl Into<String>) -> Self {
        Error::Closed { code, message: message.into() }
    }

    pub fn closed0(message: impl Into<String>) -> Self {
        Self::closed(0, message)
    }

    pub fn is_openly(&self) -> bool {
        matches!(self, Error::Openly { .. })
    }

    pub fn code(&self) -> i32 {
        match self {
            Error::Silent(_) => 0,
            Error::Openly { code, .. } | Error::Closed { code, .. } => *code,
        }
    }

    /// The `(code, message)` pair an adapter should report to the client.
    ///
    /// Openly errors expose their own units; everything else collapses to
    /// the generic service-unavailable pair.
    pub fn response_units(&self) -> (i32, String) {
        match self {
            Error::Openly { code, message } => (*code, message.clone()),
            _ => (SERVICE_UNAVAILABLE, SERVICE_UNAVAILABLE_MESSAGE.to_string()),
        }
    }
}
