use super::error::PeerError;
use super::transport::{read_frame, write_frame};
use crate::constants::{PEER_QUEUE_DEPTH, WRITER_KEEPALIVE_PERIOD};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// One frame from a peer reader: the payload, or `None` when the reader or
/// writer hit an error and the session should drop the peer.
pub type InboundFrame = (SocketAddr, Option<Bytes>);

/// Session-side state for one connected peer.
///
/// The control session owns this exclusively; the reader and writer tasks
/// only share the close signal and the outbound queue.
pub struct PeerState {
    pub addr: SocketAddr,
    pub id: [u8; 20],
    pub reserved: [u8; 8],
    /// Extension name → code mapping learned from their handshake.
    pub extensions: HashMap<String, u8>,
    pub last_read: Option<Instant>,
    outbound: mpsc::Sender<Bytes>,
    close: watch::Sender<bool>,
}

impl PeerState {
    /// Takes ownership of a handshaken connection and spawns its I/O tasks.
    pub fn spawn(
        stream: TcpStream,
        addr: SocketAddr,
        id: [u8; 20],
        reserved: [u8; 8],
        inbound: mpsc::Sender<InboundFrame>,
    ) -> Self {
        let (outbound, close) = spawn_peer_io(stream, addr, inbound);
        Self {
            addr,
            id,
            reserved,
            extensions: HashMap::new(),
            last_read: None,
            outbound,
            close,
        }
    }

    pub fn supports_dht(&self) -> bool {
        (self.reserved[7] & 0x01) != 0
    }

    pub fn supports_extensions(&self) -> bool {
        (self.reserved[5] & 0x10) != 0
    }

    /// Queues one frame payload. The queue is bounded; a full queue means
    /// the peer can't keep up and is reported as an error so the session
    /// drops it instead of blocking.
    pub fn send(&self, frame: Bytes) -> Result<(), PeerError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => PeerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PeerError::ConnectionClosed,
        })
    }

    /// Queues a keep-alive; best-effort, a stalled queue is handled by the
    /// idle sweep.
    pub fn keep_alive(&self) {
        let _ = self.outbound.try_send(Bytes::new());
    }

    /// Signals both I/O tasks to stop. Idempotent.
    pub fn close(&self) {
        let _ = self.close.send(true);
    }
}

impl Drop for PeerState {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawns the reader and writer tasks for a connection.
///
/// The reader funnels frames into `inbound` and pushes a `None` sentinel on
/// error or EOF; the writer drains the returned queue, emitting keep-alives
/// when idle, and pushes the same sentinel on write failure. Both stop once
/// the returned close signal fires.
pub fn spawn_peer_io(
    stream: TcpStream,
    addr: SocketAddr,
    inbound: mpsc::Sender<InboundFrame>,
) -> (mpsc::Sender<Bytes>, watch::Sender<bool>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Bytes>(PEER_QUEUE_DEPTH);
    let (close_tx, close_rx) = watch::channel(false);

    let (mut read_half, mut write_half) = stream.into_split();

    let mut reader_close = close_rx.clone();
    let reader_inbound = inbound.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reader_close.changed() => break,
                frame = read_frame(&mut read_half) => match frame {
                    Ok(payload) => {
                        if reader_inbound.send((addr, Some(payload))).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(%addr, %err, "peer read ended");
                        let _ = reader_inbound.send((addr, None)).await;
                        break;
                    }
                },
            }
        }
    });

    let mut writer_close = close_rx;
    tokio::spawn(async move {
        let mut idle = tokio::time::interval(WRITER_KEEPALIVE_PERIOD);
        idle.reset();
        loop {
            tokio::select! {
                _ = writer_close.changed() => break,
                queued = outbound_rx.recv() => match queued {
                    Some(frame) => {
                        if let Err(err) = write_frame(&mut write_half, &frame).await {
                            debug!(%addr, %err, "peer write failed");
                            let _ = inbound.send((addr, None)).await;
                            break;
                        }
                        idle.reset();
                    }
                    None => break,
                },
                _ = idle.tick() => {
                    if write_frame(&mut write_half, &[]).await.is_err() {
                        let _ = inbound.send((addr, None)).await;
                        break;
                    }
                }
            }
        }
    });

    (outbound_tx, close_tx)
}
