use crate::metainfo::InfoHash;
use sha1::{Digest, Sha1};
use std::fmt;

/// A `<counter>-<hash>` revision of the session's current info-hash,
/// advanced on every change. The counter gives a total order between two
/// revisions of the same lineage; the hash chains each revision to its
/// predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    counter: u64,
    hash: String,
}

impl Revision {
    /// The starting revision, displayed as `0-`.
    pub fn initial() -> Self {
        Self {
            counter: 0,
            hash: String::new(),
        }
    }

    /// Parses `<counter>-<hash>`; anything else is rejected and callers
    /// fall back to [`Revision::initial`].
    pub fn parse(s: &str) -> Option<Self> {
        let (counter, hash) = s.split_once('-')?;
        let counter = counter.parse().ok()?;
        Some(Self {
            counter,
            hash: hash.to_string(),
        })
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// The next revision for `ih`: the counter advances and the new hash is
    /// SHA-1 over the raw info-hash concatenated with the previous hash's
    /// ASCII form.
    pub fn advance(&self, ih: &InfoHash) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(ih.as_bytes());
        hasher.update(self.hash.as_bytes());
        let digest: [u8; 20] = hasher.finalize().into();

        Self {
            counter: self.counter + 1,
            hash: digest.iter().fold(String::with_capacity(40), |mut s, b| {
                use std::fmt::Write;
                let _ = write!(s, "{:02x}", b);
                s
            }),
        }
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.counter, self.hash)
    }
}
