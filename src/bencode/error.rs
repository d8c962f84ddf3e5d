use thiserror::Error;

/// Errors produced while decoding bencoded input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BencodeError {
    /// Input ran out before the value was complete.
    #[error("truncated input at byte {0}")]
    Truncated(usize),

    /// A byte that cannot start or continue a value at this position.
    #[error("unexpected byte {byte:#04x} at {at}")]
    Unexpected { byte: u8, at: usize },

    /// Integer with an empty, non-numeric, or leading-zero body.
    #[error("malformed integer at byte {0}")]
    BadInteger(usize),

    /// Byte-string length prefix that is not a decimal number.
    #[error("malformed length prefix at byte {0}")]
    BadLength(usize),

    /// A dictionary key that is not a byte string.
    #[error("non-string dictionary key at byte {0}")]
    NonStringKey(usize),

    /// Bytes left over after a complete top-level value.
    #[error("trailing bytes after value")]
    TrailingBytes,

    /// Nesting beyond the recursion limit.
    #[error("nesting depth limit exceeded")]
    DepthExceeded,
}
