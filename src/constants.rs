//! Protocol constants and tuning parameters.
//!
//! Timeouts, peer limits, and ticker periods used across the session and
//! peer layers. The announce clamp and ticker cadences follow common client
//! practice; the peer targets are sized for a gossip swarm rather than a
//! bulk-download swarm.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Vendor prefix for generated peer ids.
pub const PEER_ID_PREFIX: &str = "-bs";

/// Default BitTorrent listen port.
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Peer limits
// ============================================================================

/// Below this peer count the session keeps asking the DHT and tracker for
/// more addresses.
pub const TARGET_NUM_PEERS: usize = 15;

/// Hard cap on the peer table; additional connections are rejected.
pub const MAX_NUM_PEERS: usize = 60;

/// Outbound frame queue depth per peer. Overflow closes the peer instead of
/// blocking the session.
pub const PEER_QUEUE_DEPTH: usize = 64;

/// Inbound frame channel depth shared by all peer readers.
pub const INBOUND_QUEUE_DEPTH: usize = 256;

// ============================================================================
// Wire protocol
// ============================================================================

/// Upper bound on a single framed message.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Timeout for establishing an outbound TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a handshake read or write.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// A peer that has been silent for this long is closed by the session.
pub const PEER_IDLE_CUTOFF: Duration = Duration::from_secs(3 * 60);

/// Idle span after which the peer writer emits a keep-alive on its own.
pub const WRITER_KEEPALIVE_PERIOD: Duration = Duration::from_secs(2 * 60);

// ============================================================================
// Session tickers
// ============================================================================

/// Re-choke / heartbeat tick.
pub const RECHOKE_PERIOD: Duration = Duration::from_secs(1);

/// Periodic status log tick.
pub const VERBOSE_PERIOD: Duration = Duration::from_secs(10);

/// Keep-alive sweep tick.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(60);

/// Announce cadence until the tracker reports an interval.
pub const INITIAL_RETRACKER_PERIOD: Duration = Duration::from_secs(20);

/// Deadlock detector check period; a heartbeat must land within each span.
pub const DEADLOCK_CHECK_PERIOD: Duration = Duration::from_secs(15);

/// Bounds applied to tracker-reported announce intervals, in seconds.
pub const MIN_ANNOUNCE_INTERVAL: u64 = 120;
pub const MAX_ANNOUNCE_INTERVAL: u64 = 24 * 3600;

// ============================================================================
// Extension protocol
// ============================================================================

/// Locally assigned code for the peer-exchange extension.
pub const UT_PEX_CODE: u8 = 1;

/// Locally assigned code for the info-hash gossip extension.
pub const BS_METADATA_CODE: u8 = 2;

pub const UT_PEX_NAME: &str = "ut_pex";
pub const BS_METADATA_NAME: &str = "bs_metadata";
