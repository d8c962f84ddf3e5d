//! bitshare - peer-to-peer file sharing with info-hash gossip
//!
//! A swarm is keyed by a stable share identity rather than a single
//! torrent: peers discovered through trackers and the DHT exchange the
//! share's *current* info-hash over a BitTorrent extension protocol, and
//! the data itself is reconstructed into a piece-addressed file store.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 bencode encoding/decoding
//! - [`metainfo`] - Torrent descriptors, info-hashes, magnet links
//! - [`storage`] - The `.part`-staged on-disk file store
//! - [`peer`] - Handshake, wire framing, extension payloads, peer tasks
//! - [`tracker`] - HTTP announce client
//! - [`dht`] - BEP-5 peer discovery
//! - [`session`] - The control session and its gossip protocol
//! - [`constants`] - Protocol constants and tuning parameters

pub mod bencode;
pub mod constants;
pub mod dht;
pub mod metainfo;
pub mod peer;
pub mod session;
pub mod storage;
pub mod tracker;

pub use bencode::{decode, encode, BencodeError, Value};
pub use dht::{Dht, DhtConfig, DhtError};
pub use metainfo::{InfoHash, MagnetLink, Metainfo, MetainfoError};
pub use peer::{ExtensionHandshake, Handshake, IhMessage, PeerError, PeerId};
pub use session::{Announce, Revision, Session, SessionConfig, SessionError, ShareId};
pub use storage::{FileStore, StorageError};
pub use tracker::{AnnounceResponse, StatusReport, TrackerClient, TrackerError};
