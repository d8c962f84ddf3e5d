use super::error::PeerError;
use bytes::{BufMut, Bytes, BytesMut};

/// The BitTorrent protocol identifier carried in every handshake.
pub const PROTOCOL: &[u8] = b"BitTorrent protocol";

/// Total size of the handshake frame.
pub const HANDSHAKE_LEN: usize = 68;

/// Message id of extension-protocol messages (BEP-10). The control session
/// dispatches nothing else.
pub const EXTENSION: u8 = 20;

/// Extension sub-id of the extension handshake.
pub const EXTENSION_HANDSHAKE: u8 = 0;

/// The 68-byte handshake:
/// `[0]=19, [1..20]="BitTorrent protocol", [20..28]=reserved,
/// [28..48]=info-hash, [48..68]=peer-id`.
///
/// Reserved bit `[7] & 0x01` advertises DHT support (BEP-5) and
/// `[5] & 0x10` the extension protocol (BEP-10).
#[derive(Debug, Clone)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub reserved: [u8; 8],
}

impl Handshake {
    /// Builds our outbound handshake with both DHT and extension-protocol
    /// bits set.
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        let mut reserved = [0u8; 8];
        reserved[5] |= 0x10;
        reserved[7] |= 0x01;
        Self {
            info_hash,
            peer_id,
            reserved,
        }
    }

    pub fn supports_dht(&self) -> bool {
        (self.reserved[7] & 0x01) != 0
    }

    pub fn supports_extensions(&self) -> bool {
        (self.reserved[5] & 0x10) != 0
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_LEN);
        buf.put_u8(PROTOCOL.len() as u8);
        buf.put_slice(PROTOCOL);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.info_hash);
        buf.put_slice(&self.peer_id);
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        if data.len() < HANDSHAKE_LEN
            || data[0] as usize != PROTOCOL.len()
            || &data[1..20] != PROTOCOL
        {
            return Err(PeerError::InvalidHandshake);
        }

        let mut reserved = [0u8; 8];
        reserved.copy_from_slice(&data[20..28]);
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&data[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&data[48..68]);

        Ok(Self {
            info_hash,
            peer_id,
            reserved,
        })
    }
}
