//! Distributed Hash Table peer discovery (BEP-5).
//!
//! A compact mainline-DHT node exposing just what the control session
//! consumes: [`Dht::spawn`] to run it, [`Dht::peers_request`] to start a
//! get_peers lookup for a swarm key, [`Dht::add_node`] to feed it addresses
//! learned from peer handshakes, [`Dht::stop`], and a results channel
//! delivering batches of peer addresses per info-hash. Incoming ping,
//! find_node, and get_peers queries are answered; announce storage is not
//! kept.

mod error;
mod message;
mod node;
mod server;

pub use error::DhtError;
pub use message::{KrpcMessage, KrpcQuery, KrpcResponse};
pub use node::{Node, NodeId};
pub use server::{Dht, DhtConfig, PeerBatch};
