//! HTTP tracker client (BEP-3 announce protocol).
//!
//! The tracker runs as its own task: the session feeds it
//! [`StatusReport`]s over a channel and receives decoded
//! [`AnnounceResponse`]s back. The session never blocks on tracker I/O.

mod client;
mod error;
mod response;

pub use client::{StatusReport, TrackerClient};
pub use error::TrackerError;
pub use response::AnnounceResponse;

#[cfg(test)]
mod tests;
