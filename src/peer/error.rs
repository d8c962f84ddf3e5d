use thiserror::Error;

/// Errors scoped to a single peer; any of them closes that peer only.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid handshake")]
    InvalidHandshake,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("handshake timeout")]
    Timeout,

    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("outbound queue full")]
    QueueFull,

    /// Only extension-protocol messages are expected on this wire.
    #[error("invalid message type {0}")]
    InvalidType(u8),

    #[error("unknown extension id {0}")]
    UnknownExtension(u8),

    #[error("extension payload: {0}")]
    Extension(String),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),
}
