//! Error types for flex codec operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlexError {
    /// The input ended before a complete flex-num or packet was read.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// The flag byte carries the reserved extension bit, which this
    /// decoder does not support.
    #[error("flag byte overflows the declared field set")]
    FlagOverflow,

    /// A text field (path, sid or message) is not valid UTF-8.
    #[error("invalid text field: {0}")]
    InvalidText(#[from] std::string::FromUtf8Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec failures surface to clients as an openly(0) diagnostic; the
/// transport then drops the connection.
impl From<FlexError> for routd_x::Error {
    fn from(err: FlexError) -> Self {
        routd_x::Error::openly0(err.to_string())
    }
}
