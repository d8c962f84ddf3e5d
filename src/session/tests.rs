use super::control::{clamp_interval, persist_current, restore_current};
use super::*;
use crate::metainfo::InfoHash;
use crate::peer::{
    read_frame, read_handshake, send_handshake, write_frame, ExtensionHandshake, Handshake,
    IhMessage, EXTENSION, EXTENSION_HANDSHAKE,
};
use sha1::{Digest, Sha1};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

const READ_WAIT: Duration = Duration::from_secs(5);

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut s, b| {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
        s
    })
}

#[test]
fn test_revision_initial_form() {
    assert_eq!(Revision::initial().to_string(), "0-");
    assert_eq!(Revision::initial().counter(), 0);
}

#[test]
fn test_revision_parse() {
    let rev = Revision::parse("5-abc123").unwrap();
    assert_eq!(rev.counter(), 5);
    assert_eq!(rev.to_string(), "5-abc123");

    assert_eq!(Revision::parse("3-").unwrap().counter(), 3);
    assert!(Revision::parse("nope").is_none());
    assert!(Revision::parse("x-y").is_none());
    assert!(Revision::parse("-abc").is_none());
}

#[test]
fn test_revision_hash_chain() {
    let ih1 = InfoHash::from_hex("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").unwrap();
    let ih2 = InfoHash::from_hex("cafef00dcafef00dcafef00dcafef00dcafef00d").unwrap();

    let rev1 = Revision::initial().advance(&ih1);
    let expected1: [u8; 20] = Sha1::digest(ih1.as_bytes()).into();
    assert_eq!(rev1.to_string(), format!("1-{}", hex(&expected1)));

    let rev2 = rev1.advance(&ih2);
    let mut hasher = Sha1::new();
    hasher.update(ih2.as_bytes());
    hasher.update(hex(&expected1).as_bytes());
    let expected2: [u8; 20] = hasher.finalize().into();
    assert_eq!(rev2.to_string(), format!("2-{}", hex(&expected2)));
}

#[test]
fn test_revision_counter_counts_updates() {
    let ih = InfoHash::from_hex("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").unwrap();
    let mut rev = Revision::initial();
    for expected in 1..=5u64 {
        rev = rev.advance(&ih);
        assert_eq!(rev.counter(), expected);
    }
}

#[test]
fn test_announce_interval_clamp() {
    assert_eq!(clamp_interval(5), Duration::from_secs(120));
    assert_eq!(clamp_interval(1800), Duration::from_secs(1800));
    assert_eq!(clamp_interval(1_000_000), Duration::from_secs(86_400));
}

#[tokio::test]
async fn test_current_marker_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let ih = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();

    let message = IhMessage::new(Some(ih), "2-ff00".into(), 7777);
    persist_current(dir.path(), &message).await.unwrap();

    let (restored, rev) = restore_current(dir.path()).await;
    assert_eq!(restored, Some(ih));
    assert_eq!(rev.to_string(), "2-ff00");
}

#[tokio::test]
async fn test_current_marker_garbage_starts_from_scratch() {
    let dir = tempfile::tempdir().unwrap();

    let (restored, rev) = restore_current(dir.path()).await;
    assert_eq!(restored, None);
    assert_eq!(rev, Revision::initial());

    std::fs::write(dir.path().join("current"), b"not bencode").unwrap();
    let (restored, rev) = restore_current(dir.path()).await;
    assert_eq!(restored, None);
    assert_eq!(rev, Revision::initial());
}

#[tokio::test]
async fn test_current_marker_bad_revision_resets() {
    let dir = tempfile::tempdir().unwrap();
    let ih = InfoHash::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();

    let message = IhMessage::new(Some(ih), "bogus rev".into(), 7777);
    persist_current(dir.path(), &message).await.unwrap();

    let (restored, rev) = restore_current(dir.path()).await;
    assert_eq!(restored, Some(ih));
    assert_eq!(rev, Revision::initial());
}

#[test]
fn test_share_id_forms() {
    let share = ShareId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
    assert_eq!(share.public_id(), "0123456789abcdef0123456789abcdef01234567");
    assert_eq!(share.public_bytes().len(), 20);
    assert!(share.write_key().is_none());
    assert!(ShareId::from_hex("short").is_err());

    let generated = ShareId::generate();
    assert_eq!(generated.public_id().len(), 40);
}

async fn start_test_session(dir: &std::path::Path) -> Session {
    let share = ShareId::from_hex("0123456789abcdef0123456789abcdef01234567").unwrap();
    Session::start(SessionConfig {
        share,
        port: 0,
        dir: dir.to_path_buf(),
        trackers: Vec::new(),
    })
    .await
    .expect("session start")
}

#[tokio::test]
async fn test_extension_exchange_and_gossip() {
    let dir = tempfile::tempdir().unwrap();
    let session = start_test_session(dir.path()).await;
    let addr = SocketAddr::from(([127, 0, 0, 1], session.port()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let ours = Handshake::new([9u8; 20], [b'x'; 20]);
    send_handshake(&mut stream, &ours).await.unwrap();

    let theirs = read_handshake(&mut stream).await.unwrap();
    assert_eq!(hex(&theirs.info_hash), session.public_id());
    assert_eq!(theirs.peer_id, *session.peer_id().as_bytes());
    assert!(theirs.supports_dht());
    assert!(theirs.supports_extensions());

    // Having advertised the extension bit, we get their handshake with the
    // advertised {ut_pex: 1, bs_metadata: 2} table.
    let frame = timeout(READ_WAIT, read_frame(&mut stream)).await.unwrap().unwrap();
    assert_eq!(frame[0], EXTENSION);
    assert_eq!(frame[1], EXTENSION_HANDSHAKE);
    let handshake = ExtensionHandshake::decode(&frame[2..]).unwrap();
    assert_eq!(handshake.code_for("ut_pex"), Some(1));
    assert_eq!(handshake.code_for("bs_metadata"), Some(2));

    // Answer with our own table assigning bs_metadata code 7; the session
    // immediately reports its head as [20][7][IhMessage].
    let mine = ExtensionHandshake::with_extensions(&[("bs_metadata", 7)]);
    write_frame(&mut stream, &mine.to_frame()).await.unwrap();

    let frame = timeout(READ_WAIT, read_frame(&mut stream)).await.unwrap().unwrap();
    assert_eq!(frame[0], EXTENSION);
    assert_eq!(frame[1], 7);
    let head = IhMessage::decode(&frame[2..]).unwrap();
    assert_eq!(head.info_hash, None);
    assert_eq!(head.rev, "0-");
    assert_eq!(head.port, session.port());

    // A SetCurrent is broadcast to every bs_metadata-capable peer and
    // persisted to the current marker.
    let ih = InfoHash::from_hex("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").unwrap();
    session.set_current(ih).await;

    let frame = timeout(READ_WAIT, read_frame(&mut stream)).await.unwrap().unwrap();
    assert_eq!(frame[0], EXTENSION);
    assert_eq!(frame[1], 7);
    let update = IhMessage::decode(&frame[2..]).unwrap();
    assert_eq!(update.info_hash, Some(ih));
    assert!(update.rev.starts_with("1-"));

    assert!(dir.path().join("current").exists());
    let (restored, rev) = restore_current(dir.path()).await;
    assert_eq!(restored, Some(ih));
    assert_eq!(rev.counter(), 1);

    session.quit().await;
}

#[tokio::test]
async fn test_gossiped_announce_reaches_torrents_channel() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = start_test_session(dir.path()).await;
    let mut torrents = session.take_torrents().unwrap();
    let addr = SocketAddr::from(([127, 0, 0, 1], session.port()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    send_handshake(&mut stream, &Handshake::new([9u8; 20], [b'y'; 20]))
        .await
        .unwrap();
    read_handshake(&mut stream).await.unwrap();
    let _their_extensions = timeout(READ_WAIT, read_frame(&mut stream)).await.unwrap().unwrap();

    // Gossip a foreign info-hash; the session must surface it with our
    // observed IP and the port we advertise.
    write_frame(
        &mut stream,
        &ExtensionHandshake::with_extensions(&[("bs_metadata", 3)]).to_frame(),
    )
    .await
    .unwrap();
    let _head = timeout(READ_WAIT, read_frame(&mut stream)).await.unwrap().unwrap();

    let foreign = InfoHash::from_hex("cafef00dcafef00dcafef00dcafef00dcafef00d").unwrap();
    let gossip = IhMessage::new(Some(foreign), "4-aa".into(), 5555);
    write_frame(&mut stream, &gossip.to_frame(2)).await.unwrap();

    let announce = timeout(READ_WAIT, torrents.recv()).await.unwrap().unwrap();
    assert_eq!(announce.info_hash, foreign);
    assert_eq!(announce.peer.ip(), stream.local_addr().unwrap().ip());
    assert_eq!(announce.peer.port(), 5555);

    session.quit().await;
}

#[tokio::test]
async fn test_self_connection_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let session = start_test_session(dir.path()).await;
    let addr = SocketAddr::from(([127, 0, 0, 1], session.port()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let ours = Handshake::new([9u8; 20], *session.peer_id().as_bytes());
    send_handshake(&mut stream, &ours).await.unwrap();

    // The acceptor drops the connection without completing the handshake.
    assert!(read_handshake(&mut stream).await.is_err());

    session.quit().await;
}

#[tokio::test]
async fn test_duplicate_peer_id_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let session = start_test_session(dir.path()).await;
    let addr = SocketAddr::from(([127, 0, 0, 1], session.port()));

    // No extension bit: admitted peers stay silent, which keeps the frame
    // streams empty for the assertion below.
    let quiet = Handshake {
        info_hash: [9u8; 20],
        peer_id: [b'z'; 20],
        reserved: [0u8; 8],
    };

    let mut first = TcpStream::connect(addr).await.unwrap();
    send_handshake(&mut first, &quiet).await.unwrap();
    read_handshake(&mut first).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    send_handshake(&mut second, &quiet).await.unwrap();
    read_handshake(&mut second).await.unwrap();

    // The second connection advertises an id already in the table and is
    // dropped right after admission.
    let outcome = timeout(READ_WAIT, read_frame(&mut second)).await.unwrap();
    assert!(outcome.is_err());

    session.quit().await;
}
