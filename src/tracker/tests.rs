use super::*;
use std::net::{IpAddr, Ipv4Addr};

#[test]
fn test_parse_compact_response() {
    // peers: 127.0.0.1:6881 and 10.0.0.2:80
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:intervali1800e5:peers12:");
    data.extend_from_slice(&[127, 0, 0, 1, 0x1a, 0xe1]);
    data.extend_from_slice(&[10, 0, 0, 2, 0, 80]);
    data.extend_from_slice(b"e");

    let response = AnnounceResponse::parse(&data).unwrap();
    assert_eq!(response.interval, 1800);
    assert_eq!(response.peers.len(), 2);
    assert_eq!(
        response.peers[0],
        "127.0.0.1:6881".parse::<std::net::SocketAddr>().unwrap()
    );
    assert_eq!(
        response.peers[1],
        "10.0.0.2:80".parse::<std::net::SocketAddr>().unwrap()
    );
    assert!(response.peers6.is_empty());
}

#[test]
fn test_parse_list_form_peers() {
    let data = b"d8:intervali600e5:peersld2:ip9:127.0.0.14:porti7000eeee";
    let response = AnnounceResponse::parse(data).unwrap();
    assert_eq!(response.peers.len(), 1);
    assert_eq!(response.peers[0].ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(response.peers[0].port(), 7000);
}

#[test]
fn test_parse_peers6() {
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:intervali600e6:peers618:");
    let mut blob = [0u8; 18];
    blob[15] = 1; // ::1
    blob[16] = 0x1a;
    blob[17] = 0xe1; // port 6881
    data.extend_from_slice(&blob);
    data.extend_from_slice(b"e");

    let response = AnnounceResponse::parse(&data).unwrap();
    assert_eq!(response.peers6.len(), 1);
    assert_eq!(response.peers6[0], "[::1]:6881".parse().unwrap());
    assert_eq!(response.all_peers().count(), 1);
}

#[test]
fn test_parse_failure_reason() {
    let data = b"d14:failure reason9:not founde";
    assert!(matches!(
        AnnounceResponse::parse(data),
        Err(TrackerError::Failure(reason)) if reason == "not found"
    ));
}

#[test]
fn test_parse_requires_interval() {
    assert!(matches!(
        AnnounceResponse::parse(b"de"),
        Err(TrackerError::InvalidResponse(_))
    ));
}

#[test]
fn test_parse_ignores_short_compact_tail() {
    // 7 bytes: one full peer plus a truncated trailing byte.
    let mut data = Vec::new();
    data.extend_from_slice(b"d8:intervali60e5:peers7:");
    data.extend_from_slice(&[127, 0, 0, 1, 0, 80, 9]);
    data.extend_from_slice(b"e");

    let response = AnnounceResponse::parse(&data).unwrap();
    assert_eq!(response.peers.len(), 1);
}
