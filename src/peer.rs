//! Peer wire protocol (BEP-3, BEP-10).
//!
//! The 68-byte handshake with its capability bits, length-prefixed message
//! framing, the extension-protocol payloads carried on message id 20, and
//! the per-peer reader/writer tasks that bridge a TCP connection to the
//! control session's inbound channel.

mod error;
mod extension;
mod message;
mod peer_id;
mod state;
mod transport;

pub use error::PeerError;
pub use extension::{ExtensionHandshake, IhMessage};
pub use message::{Handshake, EXTENSION, EXTENSION_HANDSHAKE, HANDSHAKE_LEN};
pub use peer_id::PeerId;
pub use state::{spawn_peer_io, InboundFrame, PeerState};
pub use transport::{read_frame, read_handshake, send_handshake, write_frame};
