use super::error::SessionError;
use crate::metainfo::InfoHash;

/// The session's swarm identity.
///
/// The 20-byte public identifier keys DHT lookups and fills the info-hash
/// field of our handshakes. The optional write key is reserved for signing
/// gossip messages; the `sig` field it would feed is carried but unused.
#[derive(Debug, Clone)]
pub struct ShareId {
    public: [u8; 20],
    write_key: Option<String>,
}

impl ShareId {
    /// A share keyed directly by a torrent's info-hash.
    pub fn from_info_hash(hash: InfoHash) -> Self {
        Self {
            public: *hash.as_bytes(),
            write_key: None,
        }
    }

    /// Parses a 40-character hex public identifier.
    pub fn from_hex(s: &str) -> Result<Self, SessionError> {
        let hash =
            InfoHash::from_hex(s).map_err(|_| SessionError::InvalidShareId(s.to_string()))?;
        Ok(Self::from_info_hash(hash))
    }

    /// A fresh random identity.
    pub fn generate() -> Self {
        Self {
            public: rand::random(),
            write_key: None,
        }
    }

    /// The hex form used as the DHT swarm key.
    pub fn public_id(&self) -> String {
        InfoHash(self.public).to_hex()
    }

    /// The raw form carried in handshakes.
    pub fn public_bytes(&self) -> &[u8; 20] {
        &self.public
    }

    pub fn write_key(&self) -> Option<&str> {
        self.write_key.as_deref()
    }
}
