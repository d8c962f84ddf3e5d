//! The control session.
//!
//! One task owns all session state: the peer table, the current info-hash,
//! and its revision. Peer discovery results (DHT batches, tracker
//! responses), peer frames, listener accepts, timers, and commands all
//! arrive over channels and are serviced by a single `select!` loop, so no
//! locking is needed anywhere. A sibling deadlock detector aborts the
//! process if the loop stops emitting heartbeats.

mod control;
mod error;
mod revision;
mod share_id;

pub use control::{Announce, Session, SessionConfig};
pub use error::SessionError;
pub use revision::Revision;
pub use share_id::ShareId;

#[cfg(test)]
mod tests;
