use super::error::DhtError;
use super::message::{KrpcMessage, KrpcQuery, KrpcResponse};
use super::node::{Node, NodeId};
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Well-known routers used to seed an empty table.
const BOOTSTRAP_NODES: &[&str] = &[
    "router.bittorrent.com:6881",
    "dht.transmissionbt.com:6881",
    "router.utorrent.com:6881",
];

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);
const SWEEP_PERIOD: Duration = Duration::from_secs(5);
const TABLE_CAP: usize = 256;
const LOOKUP_ALPHA: usize = 3;
const LOOKUP_QUERY_CAP: usize = 64;
const BATCH_QUEUE_DEPTH: usize = 16;

/// One delivery of discovered peers, keyed by info-hash.
pub type PeerBatch = HashMap<[u8; 20], Vec<SocketAddr>>;

#[derive(Debug, Clone)]
pub struct DhtConfig {
    pub port: u16,
    /// Lookups keep going until roughly this many peers have been reported.
    pub target_peers: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            port: crate::constants::DEFAULT_PORT,
            target_peers: crate::constants::TARGET_NUM_PEERS,
        }
    }
}

enum Command {
    PeersRequest { info_hash: [u8; 20] },
    AddNode { addr: SocketAddr },
    Stop,
}

/// Handle to the running DHT task.
pub struct Dht {
    commands: mpsc::UnboundedSender<Command>,
    local_addr: SocketAddr,
}

impl Dht {
    /// Binds the UDP socket and spawns the engine. Returns the handle and
    /// the channel on which peer batches are delivered.
    pub async fn spawn(config: DhtConfig) -> Result<(Self, mpsc::Receiver<PeerBatch>), DhtError> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port)).await?;
        let local_addr = socket.local_addr()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_QUEUE_DEPTH);

        let server = Server {
            socket,
            id: NodeId::random(),
            config,
            nodes: Vec::new(),
            pending: HashMap::new(),
            lookups: HashMap::new(),
            batches: batch_tx,
            tid_counter: 0,
            reply_token: rand::random(),
        };
        tokio::spawn(server.run(command_rx));

        Ok((
            Self {
                commands: command_tx,
                local_addr,
            },
            batch_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts (or refreshes) a get_peers lookup for a swarm key. The
    /// `announce` flag is accepted for interface parity; announcing is not
    /// implemented.
    pub fn peers_request(&self, info_hash: &[u8; 20], _announce: bool) {
        let _ = self.commands.send(Command::PeersRequest {
            info_hash: *info_hash,
        });
    }

    /// Feeds an endpoint learned out-of-band (e.g. from a peer handshake).
    pub fn add_node(&self, addr: SocketAddr) {
        let _ = self.commands.send(Command::AddNode { addr });
    }

    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }
}

struct PendingQuery {
    addr: SocketAddr,
    info_hash: Option<[u8; 20]>,
    sent_at: Instant,
}

#[derive(Default)]
struct Lookup {
    queried: HashSet<SocketAddr>,
    reported: HashSet<SocketAddr>,
    outstanding: usize,
}

struct Server {
    socket: UdpSocket,
    id: NodeId,
    config: DhtConfig,
    nodes: Vec<Node>,
    pending: HashMap<Bytes, PendingQuery>,
    lookups: HashMap<[u8; 20], Lookup>,
    batches: mpsc::Sender<PeerBatch>,
    tid_counter: u16,
    reply_token: [u8; 8],
}

impl Server {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.bootstrap().await;

        let mut sweep = tokio::time::interval(SWEEP_PERIOD);
        let mut buf = [0u8; 2048];

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::PeersRequest { info_hash }) => {
                        self.start_lookup(info_hash).await;
                    }
                    Some(Command::AddNode { addr }) => {
                        self.send_query(KrpcQuery::Ping { id: self.id }, addr, None).await;
                    }
                    Some(Command::Stop) | None => break,
                },
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => self.handle_packet(&buf[..len], from).await,
                    Err(err) => {
                        warn!(%err, "dht socket receive failed");
                    }
                },
                _ = sweep.tick() => self.expire_pending(),
            }
        }
    }

    async fn bootstrap(&mut self) {
        for host in BOOTSTRAP_NODES {
            match tokio::net::lookup_host(host).await {
                Ok(addrs) => {
                    for addr in addrs.filter(SocketAddr::is_ipv4) {
                        self.send_query(KrpcQuery::Ping { id: self.id }, addr, None)
                            .await;
                    }
                }
                Err(err) => debug!(host, %err, "bootstrap resolution failed"),
            }
        }
    }

    fn remember(&mut self, node: Node) {
        if self.nodes.len() < TABLE_CAP && !self.nodes.iter().any(|n| n.addr == node.addr) {
            self.nodes.push(node);
        }
    }

    fn closest(&self, target: &[u8; 20], count: usize) -> Vec<Node> {
        let mut nodes = self.nodes.clone();
        nodes.sort_by_key(|n| n.id.distance(target));
        nodes.truncate(count);
        nodes
    }

    async fn start_lookup(&mut self, info_hash: [u8; 20]) {
        let seeds = self.closest(&info_hash, LOOKUP_ALPHA * 2);
        let lookup = self.lookups.entry(info_hash).or_default();
        if lookup.queried.len() >= LOOKUP_QUERY_CAP {
            // Start a fresh round; the swarm may have rotated.
            lookup.queried.clear();
        }

        let targets: Vec<SocketAddr> = seeds
            .iter()
            .map(|n| n.addr)
            .filter(|addr| !self.lookups[&info_hash].queried.contains(addr))
            .collect();
        for addr in targets {
            self.query_peers(info_hash, addr).await;
        }
    }

    async fn query_peers(&mut self, info_hash: [u8; 20], addr: SocketAddr) {
        let lookup = self.lookups.entry(info_hash).or_default();
        if lookup.queried.len() >= LOOKUP_QUERY_CAP || !lookup.queried.insert(addr) {
            return;
        }
        lookup.outstanding += 1;
        self.send_query(
            KrpcQuery::GetPeers {
                id: self.id,
                info_hash,
            },
            addr,
            Some(info_hash),
        )
        .await;
    }

    async fn send_query(
        &mut self,
        query: KrpcQuery,
        addr: SocketAddr,
        info_hash: Option<[u8; 20]>,
    ) {
        self.tid_counter = self.tid_counter.wrapping_add(1);
        let tid = Bytes::copy_from_slice(&self.tid_counter.to_be_bytes());

        self.pending.insert(
            tid.clone(),
            PendingQuery {
                addr,
                info_hash,
                sent_at: Instant::now(),
            },
        );

        let packet = KrpcMessage::Query { tid, query }.encode();
        if let Err(err) = self.socket.send_to(&packet, addr).await {
            debug!(%addr, %err, "dht query send failed");
        }
    }

    async fn handle_packet(&mut self, data: &[u8], from: SocketAddr) {
        let message = match KrpcMessage::decode(data) {
            Ok(message) => message,
            Err(err) => {
                debug!(%from, %err, "dropping malformed krpc packet");
                return;
            }
        };

        match message {
            KrpcMessage::Query { tid, query } => self.answer_query(tid, query, from).await,
            KrpcMessage::Response { tid, response } => {
                let Some(pending) = self.pending.remove(&tid) else {
                    return;
                };
                if pending.addr != from {
                    return;
                }
                self.handle_response(pending, response, from).await;
            }
            KrpcMessage::Error { tid, code, message } => {
                debug!(%from, code, message, "krpc error");
                if let Some(pending) = self.pending.remove(&tid) {
                    self.settle(&pending);
                }
            }
        }
    }

    async fn handle_response(
        &mut self,
        pending: PendingQuery,
        response: KrpcResponse,
        from: SocketAddr,
    ) {
        if let Some(id) = response.id {
            self.remember(Node { id, addr: from });
        }
        for node in &response.nodes {
            self.remember(*node);
        }
        self.settle(&pending);

        let Some(info_hash) = pending.info_hash else {
            return;
        };
        let Some(lookup) = self.lookups.get_mut(&info_hash) else {
            return;
        };

        if !response.values.is_empty() {
            let fresh: Vec<SocketAddr> = response
                .values
                .iter()
                .copied()
                .filter(|addr| lookup.reported.insert(*addr))
                .collect();
            if !fresh.is_empty() {
                debug!(peers = fresh.len(), "dht lookup yielded peers");
                let mut batch = PeerBatch::new();
                batch.insert(info_hash, fresh);
                let _ = self.batches.try_send(batch);
            }
        }

        // Walk toward the target while the swarm is still under-reported.
        if self.lookups[&info_hash].reported.len() < self.config.target_peers {
            let next: Vec<SocketAddr> = response
                .nodes
                .iter()
                .take(LOOKUP_ALPHA)
                .map(|n| n.addr)
                .collect();
            for addr in next {
                self.query_peers(info_hash, addr).await;
            }
        }
    }

    fn settle(&mut self, pending: &PendingQuery) {
        if let Some(info_hash) = pending.info_hash {
            if let Some(lookup) = self.lookups.get_mut(&info_hash) {
                lookup.outstanding = lookup.outstanding.saturating_sub(1);
            }
        }
    }

    async fn answer_query(&mut self, tid: Bytes, query: KrpcQuery, from: SocketAddr) {
        let response = match query {
            KrpcQuery::Ping { id } => {
                self.remember(Node { id, addr: from });
                KrpcResponse {
                    id: Some(self.id),
                    ..Default::default()
                }
            }
            KrpcQuery::FindNode { id, target } => {
                self.remember(Node { id, addr: from });
                KrpcResponse {
                    id: Some(self.id),
                    nodes: self.closest(target.as_bytes(), 8),
                    ..Default::default()
                }
            }
            KrpcQuery::GetPeers { id, info_hash } => {
                self.remember(Node { id, addr: from });
                KrpcResponse {
                    id: Some(self.id),
                    nodes: self.closest(&info_hash, 8),
                    token: Some(Bytes::copy_from_slice(&self.reply_token)),
                    ..Default::default()
                }
            }
        };

        let packet = KrpcMessage::Response { tid, response }.encode();
        if let Err(err) = self.socket.send_to(&packet, from).await {
            debug!(%from, %err, "dht reply send failed");
        }
    }

    fn expire_pending(&mut self) {
        let now = Instant::now();
        let expired: Vec<Bytes> = self
            .pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.sent_at) > QUERY_TIMEOUT)
            .map(|(tid, _)| tid.clone())
            .collect();
        for tid in expired {
            if let Some(pending) = self.pending.remove(&tid) {
                self.settle(&pending);
            }
        }
    }
}
