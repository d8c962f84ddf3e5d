//! Bencode encoding and decoding (BEP-3).
//!
//! Bencode is the serialization used by torrent descriptors, tracker
//! responses, extension-protocol payloads, and KRPC. Values are modeled by
//! [`Value`]; [`decode`] parses exactly one value from a byte slice and
//! [`encode`] produces the canonical byte form (dictionary keys sorted).

mod codec;
mod error;
mod value;

pub use codec::{decode, encode};
pub use error::BencodeError;
pub use value::Value;

#[cfg(test)]
mod tests;
