use super::error::TrackerError;
use crate::bencode::{decode, Value};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A decoded announce response: peer lists and the reporting interval.
#[derive(Debug, Clone, Default)]
pub struct AnnounceResponse {
    /// Seconds until the next announce, as reported (unclamped).
    pub interval: u64,
    pub peers: Vec<SocketAddr>,
    pub peers6: Vec<SocketAddr>,
}

impl AnnounceResponse {
    /// Parses a bencoded announce response. `peers` is accepted in both the
    /// compact (BEP-23) and dictionary-list forms; `peers6` (BEP-7) is
    /// always compact.
    pub fn parse(data: &[u8]) -> Result<Self, TrackerError> {
        let value = decode(data)?;
        if value.as_dict().is_none() {
            return Err(TrackerError::InvalidResponse("expected dict"));
        }

        if let Some(reason) = value.get_str(b"failure reason") {
            return Err(TrackerError::Failure(reason.to_string()));
        }

        let interval = value
            .get_int(b"interval")
            .ok_or(TrackerError::InvalidResponse("missing interval"))?
            .max(0) as u64;

        let mut response = AnnounceResponse {
            interval,
            ..Default::default()
        };

        match value.get(b"peers") {
            Some(Value::Bytes(compact)) => response.peers = parse_compact_v4(compact),
            Some(Value::List(list)) => {
                for peer in list {
                    let ip = peer.get_str(b"ip").and_then(|s| s.parse::<IpAddr>().ok());
                    let port = peer
                        .get_int(b"port")
                        .filter(|p| (0..=u16::MAX as i64).contains(p));
                    if let (Some(ip), Some(port)) = (ip, port) {
                        response.peers.push(SocketAddr::new(ip, port as u16));
                    }
                }
            }
            _ => {}
        }

        if let Some(compact) = value.get_bytes(b"peers6") {
            response.peers6 = parse_compact_v6(compact);
        }

        Ok(response)
    }

    pub fn all_peers(&self) -> impl Iterator<Item = &SocketAddr> {
        self.peers.iter().chain(self.peers6.iter())
    }
}

/// 6-byte blobs: 4 bytes IPv4 + 2 bytes big-endian port.
fn parse_compact_v4(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}

/// 18-byte blobs: 16 bytes IPv6 + 2 bytes big-endian port.
fn parse_compact_v6(data: &[u8]) -> Vec<SocketAddr> {
    data.chunks_exact(18)
        .map(|chunk| {
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&chunk[..16]);
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip)), port)
        })
        .collect()
}
