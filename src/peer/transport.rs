use super::error::PeerError;
use super::message::{Handshake, HANDSHAKE_LEN};
use crate::constants::{HANDSHAKE_TIMEOUT, MAX_FRAME_SIZE};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Sends our handshake, bounded by the handshake timeout.
pub async fn send_handshake<W>(writer: &mut W, handshake: &Handshake) -> Result<(), PeerError>
where
    W: AsyncWrite + Unpin,
{
    let data = handshake.encode();
    timeout(HANDSHAKE_TIMEOUT, writer.write_all(&data))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Ok(())
}

/// Reads and validates the remote 68-byte handshake.
pub async fn read_handshake<R>(reader: &mut R) -> Result<Handshake, PeerError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HANDSHAKE_LEN];
    timeout(HANDSHAKE_TIMEOUT, reader.read_exact(&mut buf))
        .await
        .map_err(|_| PeerError::Timeout)??;
    Handshake::decode(&buf)
}

/// Reads one length-prefixed frame and returns its payload. A keep-alive
/// (length zero) yields an empty payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, PeerError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).await?;
    let len = u32::from_be_bytes(prefix) as usize;

    if len == 0 {
        return Ok(Bytes::new());
    }
    if len > MAX_FRAME_SIZE {
        return Err(PeerError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

/// Writes one frame, prefixing the payload with its big-endian length. An
/// empty payload is the keep-alive.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), PeerError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}
