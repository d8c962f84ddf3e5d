//! Torrent metainfo handling (BEP-3, BEP-9).
//!
//! Parses torrent descriptors from raw bytes, local files, HTTP URLs, or
//! magnet URIs, computes the SHA-1 info-hash over the canonical `info`
//! encoding, and persists descriptors under their hex info-hash name.

mod error;
mod info_hash;
mod magnet;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use magnet::MagnetLink;
pub use torrent::{File, Info, Metainfo};

#[cfg(test)]
mod tests;
