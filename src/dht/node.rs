use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// A 160-bit DHT node identifier compared by XOR distance.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub [u8; 20]);

impl NodeId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 20 {
            return None;
        }
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Some(Self(id))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to a 20-byte target, comparable lexicographically.
    pub fn distance(&self, target: &[u8; 20]) -> [u8; 20] {
        let mut out = [0u8; 20];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ target[i];
        }
        out
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "…")
    }
}

/// A remote DHT node: identifier plus UDP endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
}

/// Parses 26-byte compact node infos: 20-byte id + IPv4 endpoint.
pub fn parse_compact_nodes(data: &[u8]) -> Vec<Node> {
    data.chunks_exact(26)
        .filter_map(|chunk| {
            let id = NodeId::from_slice(&chunk[..20])?;
            let addr = parse_compact_peer(&chunk[20..])?;
            Some(Node { id, addr })
        })
        .collect()
}

/// Encodes nodes in the 26-byte compact form, skipping IPv6 endpoints.
pub fn encode_compact_nodes(nodes: &[Node]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * 26);
    for node in nodes {
        if let SocketAddr::V4(v4) = node.addr {
            out.extend_from_slice(node.id.as_bytes());
            out.extend_from_slice(&v4.ip().octets());
            out.extend_from_slice(&v4.port().to_be_bytes());
        }
    }
    out
}

/// Parses one compact peer endpoint: 6 bytes (IPv4) or 18 bytes (IPv6).
pub fn parse_compact_peer(data: &[u8]) -> Option<SocketAddr> {
    match data.len() {
        6 => {
            let ip = Ipv4Addr::new(data[0], data[1], data[2], data[3]);
            let port = u16::from_be_bytes([data[4], data[5]]);
            Some(SocketAddr::new(IpAddr::V4(ip), port))
        }
        18 => {
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&data[..16]);
            let port = u16::from_be_bytes([data[16], data[17]]);
            Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(ip)), port))
        }
        _ => None,
    }
}
