use super::revision::Revision;
use super::share_id::ShareId;
use super::SessionError;
use crate::constants::{
    BS_METADATA_NAME, CONNECT_TIMEOUT, DEADLOCK_CHECK_PERIOD, INBOUND_QUEUE_DEPTH,
    INITIAL_RETRACKER_PERIOD, KEEPALIVE_PERIOD, MAX_ANNOUNCE_INTERVAL, MAX_NUM_PEERS,
    MIN_ANNOUNCE_INTERVAL, PEER_IDLE_CUTOFF, RECHOKE_PERIOD, TARGET_NUM_PEERS, UT_PEX_NAME,
    VERBOSE_PERIOD,
};
use crate::dht::{Dht, DhtConfig, PeerBatch};
use crate::metainfo::InfoHash;
use crate::peer::{
    read_handshake, send_handshake, ExtensionHandshake, Handshake, IhMessage, InboundFrame,
    PeerError, PeerId, PeerState, EXTENSION, EXTENSION_HANDSHAKE,
};
use crate::tracker::{AnnounceResponse, StatusReport, TrackerClient};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant as TickInstant};
use tracing::{debug, error, info, warn};

/// Extensions we advertise: extension handshakes carry this mapping and
/// incoming codes are resolved against it.
const OUR_EXTENSIONS: &[(&str, u8)] = &[
    (UT_PEX_NAME, crate::constants::UT_PEX_CODE),
    (BS_METADATA_NAME, crate::constants::BS_METADATA_CODE),
];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub share: ShareId,
    /// TCP listen port; 0 picks an ephemeral port. The DHT binds the same
    /// port number on UDP.
    pub port: u16,
    /// Directory holding the persisted `current` marker.
    pub dir: PathBuf,
    /// Announce URLs tried in order; may be empty.
    pub trackers: Vec<String>,
}

/// A swarm switch proposal gossiped by a peer: the advertised info-hash
/// and the endpoint to reach them on (their observed IP, their advertised
/// port).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub info_hash: InfoHash,
    pub peer: SocketAddr,
}

enum Command {
    SetCurrent(InfoHash),
    HintPeer(SocketAddr),
    Quit,
}

/// Handle to a running control session.
pub struct Session {
    commands: mpsc::Sender<Command>,
    torrents: Option<mpsc::Receiver<Announce>>,
    port: u16,
    peer_id: PeerId,
    share: ShareId,
}

impl Session {
    /// Binds the listener and the DHT, restores the persisted `current`
    /// marker, and spawns the event loop plus its deadlock detector.
    pub async fn start(config: SessionConfig) -> Result<Self, SessionError> {
        tokio::fs::create_dir_all(&config.dir).await?;

        let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
        let port = listener.local_addr()?.port();
        let peer_id = PeerId::generate();

        let (dht, dht_batches) = Dht::spawn(DhtConfig {
            port,
            target_peers: TARGET_NUM_PEERS,
        })
        .await?;
        dht.peers_request(config.share.public_bytes(), true);

        let (current_ih, rev) = restore_current(&config.dir).await;

        let (command_tx, command_rx) = mpsc::channel(16);
        let (torrent_tx, torrent_rx) = mpsc::channel(16);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (admit_tx, admit_rx) = mpsc::channel(16);
        let (tracker_tx, tracker_rx) = mpsc::channel(8);
        let tracker_reports = TrackerClient::start(config.trackers.clone(), tracker_tx)?;

        let header = Handshake::new(*config.share.public_bytes(), *peer_id.as_bytes());

        let control = ControlLoop {
            share: config.share.clone(),
            dir: config.dir,
            port,
            peer_id,
            header,
            current_ih,
            rev,
            peers: HashMap::new(),
            dht,
            dht_batches,
            tracker_reports,
            tracker_responses: tracker_rx,
            inbound_tx,
            inbound_rx,
            admit_tx,
            admit_rx,
            torrents: torrent_tx,
            commands: command_rx,
            listener,
        };
        tokio::spawn(control.run());

        Ok(Self {
            commands: command_tx,
            torrents: Some(torrent_rx),
            port,
            peer_id,
            share: config.share,
        })
    }

    /// Makes `ih` the session's current info-hash: the revision advances,
    /// the marker is persisted, and the change is gossiped to peers.
    pub async fn set_current(&self, ih: InfoHash) {
        let _ = self.commands.send(Command::SetCurrent(ih)).await;
    }

    /// Suggests a peer address learned out-of-band.
    pub async fn hint_peer(&self, addr: SocketAddr) {
        let _ = self.commands.send(Command::HintPeer(addr)).await;
    }

    pub async fn quit(&self) {
        let _ = self.commands.send(Command::Quit).await;
    }

    /// The channel of swarm announces gossiped by peers. Yields `None`
    /// after the first call.
    pub fn take_torrents(&mut self) -> Option<mpsc::Receiver<Announce>> {
        self.torrents.take()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn public_id(&self) -> String {
        self.share.public_id()
    }
}

struct Admission {
    stream: TcpStream,
    handshake: Handshake,
    addr: SocketAddr,
}

struct ControlLoop {
    share: ShareId,
    dir: PathBuf,
    port: u16,
    peer_id: PeerId,
    header: Handshake,
    current_ih: Option<InfoHash>,
    rev: Revision,
    peers: HashMap<SocketAddr, PeerState>,
    dht: Dht,
    dht_batches: mpsc::Receiver<PeerBatch>,
    tracker_reports: mpsc::Sender<StatusReport>,
    tracker_responses: mpsc::Receiver<AnnounceResponse>,
    inbound_tx: mpsc::Sender<InboundFrame>,
    inbound_rx: mpsc::Receiver<InboundFrame>,
    admit_tx: mpsc::Sender<Admission>,
    admit_rx: mpsc::Receiver<Admission>,
    torrents: mpsc::Sender<Announce>,
    commands: mpsc::Receiver<Command>,
    listener: TcpListener,
}

impl ControlLoop {
    async fn run(mut self) {
        let (heartbeat_tx, heartbeat_rx) = mpsc::channel(1);
        spawn_deadlock_detector(heartbeat_rx);

        let _ = self.tracker_reports.send(self.status_report("started")).await;

        let mut rechoke = interval_at(TickInstant::now() + RECHOKE_PERIOD, RECHOKE_PERIOD);
        let mut verbose = interval_at(TickInstant::now() + VERBOSE_PERIOD, VERBOSE_PERIOD);
        let mut keepalive = interval_at(TickInstant::now() + KEEPALIVE_PERIOD, KEEPALIVE_PERIOD);
        let mut retracker = interval_at(
            TickInstant::now() + INITIAL_RETRACKER_PERIOD,
            INITIAL_RETRACKER_PERIOD,
        );

        info!(port = self.port, share = %self.share.public_id(), "control session started");

        loop {
            tokio::select! {
                _ = retracker.tick() => {
                    let _ = self.tracker_reports.try_send(self.status_report(""));
                }
                Some(batch) = self.dht_batches.recv() => self.handle_dht_batch(batch),
                Some(response) = self.tracker_responses.recv() => {
                    self.handle_tracker_response(&response);
                    let period = clamp_interval(response.interval);
                    retracker = interval_at(TickInstant::now() + period, period);
                }
                Some((addr, frame)) = self.inbound_rx.recv() => self.handle_frame(addr, frame),
                Some(admission) = self.admit_rx.recv() => self.add_peer(admission),
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, from)) => {
                        tokio::spawn(accept_peer(
                            stream,
                            from,
                            self.header.clone(),
                            self.admit_tx.clone(),
                        ));
                    }
                    Err(err) => warn!(%err, "listener accept failed"),
                },
                _ = rechoke.tick() => {
                    let _ = heartbeat_tx.try_send(());
                    if self.peers.len() < TARGET_NUM_PEERS {
                        self.dht.peers_request(self.share.public_bytes(), true);
                        let _ = self.tracker_reports.try_send(self.status_report(""));
                    }
                }
                _ = verbose.tick() => {
                    info!(peers = self.peers.len(), rev = %self.rev, "session status");
                }
                _ = keepalive.tick() => self.sweep_idle_peers(),
                command = self.commands.recv() => match command {
                    Some(Command::SetCurrent(ih)) => self.set_current(ih).await,
                    Some(Command::HintPeer(addr)) => self.hint_new_peer(addr),
                    Some(Command::Quit) | None => break,
                },
            }
        }

        info!("quitting session");
        for (_, peer) in self.peers.drain() {
            peer.close();
        }
        self.dht.stop();
    }

    fn status_report(&self, event: &'static str) -> StatusReport {
        StatusReport {
            event,
            info_hash: InfoHash(*self.share.public_bytes()),
            peer_id: self.peer_id,
            port: self.port,
            uploaded: 0,
            downloaded: 0,
            left: 0,
        }
    }

    fn handle_dht_batch(&mut self, batch: PeerBatch) {
        for (_info_hash, addrs) in batch {
            for addr in addrs {
                self.hint_new_peer(addr);
            }
        }
    }

    fn handle_tracker_response(&mut self, response: &AnnounceResponse) {
        let mut fresh = 0;
        for addr in response.all_peers() {
            if !self.peers.contains_key(addr) {
                fresh += 1;
                self.hint_new_peer(*addr);
            }
        }
        debug!(fresh, interval = response.interval, "tracker response");
    }

    fn hint_new_peer(&self, addr: SocketAddr) {
        if self.peers.contains_key(&addr) {
            return;
        }
        tokio::spawn(connect_to_peer(
            addr,
            self.header.clone(),
            self.admit_tx.clone(),
        ));
    }

    /// Peer admission: dedup by remote id, honor the table cap, spawn the
    /// I/O tasks, then introduce ourselves on the extension layer.
    fn add_peer(&mut self, admission: Admission) {
        let Admission {
            stream,
            handshake,
            addr,
        } = admission;

        if self.peers.values().any(|p| p.id == handshake.peer_id) {
            debug!(%addr, "duplicate peer id, dropping connection");
            return;
        }
        if self.peers.len() >= MAX_NUM_PEERS {
            info!(%addr, "peer table full, rejecting");
            return;
        }

        let peer = PeerState::spawn(
            stream,
            addr,
            handshake.peer_id,
            handshake.reserved,
            self.inbound_tx.clone(),
        );

        if peer.supports_dht() {
            // The engine dedups nodes it already knows.
            self.dht.add_node(addr);
        }
        let wants_extensions = peer.supports_extensions();
        self.peers.insert(addr, peer);
        debug!(%addr, total = self.peers.len(), "peer added");

        if wants_extensions {
            let mut ours = ExtensionHandshake::with_extensions(OUR_EXTENSIONS);
            ours.client = Some(concat!("bitshare ", env!("CARGO_PKG_VERSION")).to_string());
            let frame = ours.to_frame();
            if self.peers[&addr].send(frame).is_err() {
                self.close_peer(addr);
            }
        }
    }

    fn close_peer(&mut self, addr: SocketAddr) {
        if let Some(peer) = self.peers.remove(&addr) {
            peer.close();
        }
    }

    fn handle_frame(&mut self, addr: SocketAddr, frame: Option<Bytes>) {
        let Some(payload) = frame else {
            // Reader or writer sentinel: the connection is gone.
            self.close_peer(addr);
            return;
        };
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.last_read = Some(Instant::now());
        } else {
            return;
        }
        if let Err(err) = self.do_message(addr, &payload) {
            debug!(%addr, %err, "closing peer");
            self.close_peer(addr);
        }
    }

    /// Dispatches one frame. Only extension-protocol traffic is valid on
    /// this wire; anything else closes the peer.
    fn do_message(&mut self, addr: SocketAddr, payload: &[u8]) -> Result<(), PeerError> {
        if payload.is_empty() {
            return Ok(()); // keep-alive
        }
        if payload[0] != EXTENSION {
            return Err(PeerError::InvalidType(payload[0]));
        }
        if payload.len() < 2 {
            return Err(PeerError::Extension("truncated extension frame".into()));
        }

        let code = payload[1];
        let body = &payload[2..];
        if code == EXTENSION_HANDSHAKE {
            return self.on_extension_handshake(addr, body);
        }
        match OUR_EXTENSIONS
            .iter()
            .find(|(_, our_code)| *our_code == code)
            .map(|(name, _)| *name)
        {
            Some(name) if name == BS_METADATA_NAME => self.on_ih_message(addr, body),
            Some(_) => Ok(()), // ut_pex: accepted, intentionally unhandled
            None => Err(PeerError::UnknownExtension(code)),
        }
    }

    fn on_extension_handshake(&mut self, addr: SocketAddr, body: &[u8]) -> Result<(), PeerError> {
        let theirs = ExtensionHandshake::decode(body)?;
        let Some(peer) = self.peers.get_mut(&addr) else {
            return Ok(());
        };
        peer.extensions = theirs.extensions.into_iter().collect();

        // Their table is known now; bring them up to date on our head.
        if let Some(code) = peer.extensions.get(BS_METADATA_NAME).copied() {
            let message = IhMessage::new(self.current_ih, self.rev.to_string(), self.port);
            peer.send(message.to_frame(code))?;
        }
        Ok(())
    }

    fn on_ih_message(&mut self, addr: SocketAddr, body: &[u8]) -> Result<(), PeerError> {
        let message = IhMessage::decode(body)?;
        let Some(info_hash) = message.info_hash else {
            return Ok(());
        };
        if message.port == 0 || Some(info_hash) == self.current_ih {
            return Ok(());
        }
        let Some(peer) = self.peers.get(&addr) else {
            return Ok(());
        };

        // Trust the observed IP, not anything self-reported; combine it
        // with the port they advertise for new connections.
        let endpoint = SocketAddr::new(peer.addr.ip(), message.port);
        let announce = Announce {
            info_hash,
            peer: endpoint,
        };
        if self.torrents.try_send(announce).is_err() {
            warn!(%info_hash, "torrents channel full, dropping announce");
        }
        Ok(())
    }

    async fn set_current(&mut self, ih: InfoHash) {
        self.current_ih = Some(ih);
        self.rev = self.rev.advance(&ih);

        let message = IhMessage::new(self.current_ih, self.rev.to_string(), self.port);
        if let Err(err) = persist_current(&self.dir, &message).await {
            error!(%err, "couldn't persist current marker");
            std::process::exit(1);
        }
        info!(info_hash = %ih, rev = %self.rev, "current info-hash updated");
        self.broadcast(&message);
    }

    fn broadcast(&mut self, message: &IhMessage) {
        let mut dead = Vec::new();
        for (addr, peer) in &self.peers {
            let Some(code) = peer.extensions.get(BS_METADATA_NAME).copied() else {
                continue;
            };
            if peer.send(message.to_frame(code)).is_err() {
                dead.push(*addr);
            }
        }
        for addr in dead {
            self.close_peer(addr);
        }
    }

    fn sweep_idle_peers(&mut self) {
        let now = Instant::now();
        let stale: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, peer)| {
                matches!(peer.last_read, Some(t) if now.duration_since(t) > PEER_IDLE_CUTOFF)
            })
            .map(|(addr, _)| *addr)
            .collect();
        for addr in stale {
            debug!(%addr, "closing idle peer");
            self.close_peer(addr);
        }
        for peer in self.peers.values() {
            peer.keep_alive();
        }
    }
}

/// Outbound connect: handshake first, self-connection guard, then hand the
/// stream to the loop for admission.
async fn connect_to_peer(addr: SocketAddr, ours: Handshake, admit: mpsc::Sender<Admission>) {
    let Ok(Ok(mut stream)) = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await else {
        return;
    };
    if send_handshake(&mut stream, &ours).await.is_err() {
        return;
    }
    let theirs = match read_handshake(&mut stream).await {
        Ok(theirs) => theirs,
        Err(err) => {
            debug!(%addr, %err, "outbound handshake failed");
            return;
        }
    };
    if theirs.peer_id == ours.peer_id {
        debug!(%addr, "connected to ourselves, closing");
        return;
    }
    let _ = admit
        .send(Admission {
            stream,
            handshake: theirs,
            addr,
        })
        .await;
}

/// Inbound accept: read their handshake, guard against self-connections,
/// answer with ours, then hand off for admission.
async fn accept_peer(
    mut stream: TcpStream,
    addr: SocketAddr,
    ours: Handshake,
    admit: mpsc::Sender<Admission>,
) {
    let theirs = match read_handshake(&mut stream).await {
        Ok(theirs) => theirs,
        Err(err) => {
            debug!(%addr, %err, "inbound handshake failed");
            return;
        }
    };
    if theirs.peer_id == ours.peer_id {
        debug!(%addr, "inbound connection from ourselves, closing");
        return;
    }
    if send_handshake(&mut stream, &ours).await.is_err() {
        return;
    }
    let _ = admit
        .send(Admission {
            stream,
            handshake: theirs,
            addr,
        })
        .await;
}

/// Aborts the process when the control loop stops heartbeating: the
/// architecture relies on bounded dispatch latency, and a wedged loop is
/// unrecoverable.
fn spawn_deadlock_detector(mut heartbeat: mpsc::Receiver<()>) {
    tokio::spawn(async move {
        let mut last = Instant::now();
        loop {
            tokio::select! {
                beat = heartbeat.recv() => match beat {
                    Some(()) => last = Instant::now(),
                    None => break, // loop exited normally
                },
                _ = tokio::time::sleep(DEADLOCK_CHECK_PERIOD) => {
                    error!(
                        stalled_secs = last.elapsed().as_secs(),
                        "control loop heartbeat stalled; aborting"
                    );
                    std::process::abort();
                }
            }
        }
    });
}

pub(crate) fn clamp_interval(secs: u64) -> Duration {
    Duration::from_secs(secs.clamp(MIN_ANNOUNCE_INTERVAL, MAX_ANNOUNCE_INTERVAL))
}

/// Atomically replaces `{dir}/current` with the bencoded message.
pub(crate) async fn persist_current(dir: &Path, message: &IhMessage) -> std::io::Result<()> {
    let tmp = dir.join("current.tmp");
    tokio::fs::write(&tmp, message.encode()).await?;
    tokio::fs::rename(&tmp, dir.join("current")).await
}

/// Restores the persisted marker; any failure starts from scratch.
pub(crate) async fn restore_current(dir: &Path) -> (Option<InfoHash>, Revision) {
    let data = match tokio::fs::read(dir.join("current")).await {
        Ok(data) => data,
        Err(_) => return (None, Revision::initial()),
    };
    match IhMessage::decode(&data) {
        Ok(message) => {
            let rev = Revision::parse(&message.rev).unwrap_or_else(Revision::initial);
            (message.info_hash, rev)
        }
        Err(err) => {
            warn!(%err, "couldn't decode current marker, starting from scratch");
            (None, Revision::initial())
        }
    }
}
