use crate::constants::PEER_ID_PREFIX;
use rand::Rng as _;
use std::fmt;

/// A 20-byte ASCII peer id: vendor prefix, process id, and a random
/// suffix, generated once per process.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let raw = format!(
            "{}{}_{}",
            PEER_ID_PREFIX,
            std::process::id(),
            rng.random::<u64>()
        );

        let mut id = [0u8; 20];
        let head = raw.as_bytes().len().min(20);
        id[..head].copy_from_slice(&raw.as_bytes()[..head]);
        for slot in id[head..].iter_mut() {
            *slot = rng.random_range(b'0'..=b'9');
        }
        Self(id)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", *byte as char)?;
            } else {
                write!(f, "%{:02x}", byte)?;
            }
        }
        Ok(())
    }
}
