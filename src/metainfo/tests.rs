use super::*;
use sha1::{Digest, Sha1};

fn single_file_torrent() -> Vec<u8> {
    // info: {length: 4, name: "a", piece length: 4, pieces: sha1("ABCD")}
    let piece_hash: [u8; 20] = Sha1::digest(b"ABCD").into();
    let mut data = Vec::new();
    data.extend_from_slice(b"d4:infod6:lengthi4e4:name1:a12:piece lengthi4e6:pieces20:");
    data.extend_from_slice(&piece_hash);
    data.extend_from_slice(b"ee");
    data
}

#[test]
fn test_single_file_known_hash() {
    let data = single_file_torrent();
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    // The info-hash must equal SHA-1 over the bencoded info sub-dictionary.
    let info_start = data.iter().position(|&b| b == b'd').unwrap() + 7;
    let info_bytes = &data[info_start..data.len() - 1];
    let expected: [u8; 20] = Sha1::digest(info_bytes).into();

    assert_eq!(metainfo.info_hash.as_bytes(), &expected);
    assert_eq!(metainfo.raw_info().as_ref(), info_bytes);

    let info = metainfo.info.unwrap();
    assert_eq!(info.name, "a");
    assert_eq!(info.total_length, 4);
    assert_eq!(info.piece_length, 4);
    assert_eq!(info.pieces.len(), 1);
    assert_eq!(info.files.len(), 1);
    assert_eq!(info.files[0].path, std::path::PathBuf::from("a"));
}

#[test]
fn test_multi_file_layout() {
    let data = b"d4:infod5:filesld6:lengthi3e4:pathl1:xeed6:lengthi5e4:pathl1:d1:yeee4:name1:r12:piece lengthi8e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";
    let metainfo = Metainfo::from_bytes(data).unwrap();
    let info = metainfo.info.unwrap();

    assert_eq!(info.total_length, 8);
    assert_eq!(info.files.len(), 2);
    assert_eq!(info.files[0].path, std::path::PathBuf::from("r/x"));
    assert_eq!(info.files[0].length, 3);
    assert_eq!(info.files[0].offset, 0);
    assert_eq!(info.files[1].path, std::path::PathBuf::from("r/d/y"));
    assert_eq!(info.files[1].length, 5);
    assert_eq!(info.files[1].offset, 3);
}

#[test]
fn test_missing_info_is_an_error() {
    assert!(matches!(
        Metainfo::from_bytes(b"d8:announce3:urle"),
        Err(MetainfoError::MissingField("info"))
    ));
}

#[test]
fn test_pieces_must_be_multiple_of_twenty() {
    let data = b"d4:infod6:lengthi4e4:name1:a12:piece lengthi4e6:pieces3:abcee";
    assert!(matches!(
        Metainfo::from_bytes(data),
        Err(MetainfoError::InvalidField("pieces"))
    ));
}

#[test]
fn test_length_and_files_together_is_malformed() {
    let data = b"d4:infod5:filesld6:lengthi3e4:pathl1:xeee6:lengthi3e4:name1:r12:piece lengthi4e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";
    assert!(matches!(
        Metainfo::from_bytes(data),
        Err(MetainfoError::InvalidField("length and files"))
    ));
}

#[test]
fn test_announce_and_tiers() {
    let data = b"d8:announce14:http://one/ann13:announce-listll14:http://one/annel14:http://two/annee4:infod6:lengthi4e4:name1:a12:piece lengthi4e6:pieces20:aaaaaaaaaaaaaaaaaaaaee";
    let metainfo = Metainfo::from_bytes(data).unwrap();
    assert_eq!(metainfo.announce.as_deref(), Some("http://one/ann"));
    assert_eq!(metainfo.announce_list.len(), 2);
    // trackers() deduplicates the primary against the tier entries.
    assert_eq!(
        metainfo.trackers(),
        vec!["http://one/ann".to_string(), "http://two/ann".to_string()]
    );
}

#[test]
fn test_magnet_parse() {
    let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=demo&tr=http%3A%2F%2Ft.example%2Fannounce";
    let magnet = MagnetLink::parse(uri).unwrap();
    assert_eq!(
        magnet.info_hash.to_hex(),
        "0123456789abcdef0123456789abcdef01234567"
    );
    assert_eq!(magnet.display_name.as_deref(), Some("demo"));
    assert_eq!(magnet.trackers, vec!["http://t.example/announce".to_string()]);
}

#[test]
fn test_magnet_stub_has_no_info() {
    let magnet =
        MagnetLink::parse("magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567").unwrap();
    let metainfo = Metainfo::from_magnet(&magnet);
    assert!(metainfo.info.is_none());
    assert_eq!(
        metainfo.info_hash.to_hex(),
        "0123456789abcdef0123456789abcdef01234567"
    );
}

#[test]
fn test_magnet_decodes_escaped_utf8() {
    // "✓" is three percent-escaped bytes; they must reassemble into one
    // character, not three mojibake ones.
    let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=ok+%E2%9C%93";
    let magnet = MagnetLink::parse(uri).unwrap();
    assert_eq!(magnet.display_name.as_deref(), Some("ok ✓"));

    // A malformed escape survives literally instead of corrupting the rest.
    let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=50%25+off&tr=100%zz";
    let magnet = MagnetLink::parse(uri).unwrap();
    assert_eq!(magnet.display_name.as_deref(), Some("50% off"));
    assert_eq!(magnet.trackers, vec!["100%zz".to_string()]);
}

#[test]
fn test_magnet_rejects_bad_xt() {
    assert!(MagnetLink::parse("magnet:?dn=nohash").is_err());
    assert!(MagnetLink::parse("magnet:?xt=urn:btih:short").is_err());
    assert!(MagnetLink::parse("http://not-a-magnet").is_err());
}

#[tokio::test]
async fn test_load_prefers_content_then_file() {
    let data = single_file_torrent();

    // Raw content resolves without touching the filesystem.
    let from_content = Metainfo::load(std::str::from_utf8(&data).unwrap_or("\u{fffd}"))
        .await
        .ok();
    // The bytes above contain the raw digest and are rarely valid UTF-8, so
    // exercise the file fallback with an on-disk copy as well.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("demo.torrent");
    std::fs::write(&path, &data).unwrap();
    let from_file = Metainfo::load(path.to_str().unwrap()).await.unwrap();
    assert_eq!(from_file.info.as_ref().unwrap().name, "a");

    if let Some(m) = from_content {
        assert_eq!(m.info_hash, from_file.info_hash);
    }
}

#[tokio::test]
async fn test_save_to_disk_roundtrip() {
    let data = single_file_torrent();
    let metainfo = Metainfo::from_bytes(&data).unwrap();

    let dir = tempfile::tempdir().unwrap();
    metainfo.save_to_disk(dir.path()).await.unwrap();

    let saved = std::fs::read(dir.path().join(metainfo.info_hash.to_hex())).unwrap();
    let reloaded = Metainfo::from_bytes(&saved).unwrap();
    assert_eq!(reloaded.info_hash, metainfo.info_hash);
    assert_eq!(reloaded.info.unwrap().name, "a");
}

#[test]
fn test_info_hash_hex_roundtrip() {
    let hash = InfoHash::from_hex("00ff0102030405060708090a0b0c0d0e0f101112").unwrap();
    assert_eq!(hash.to_hex(), "00ff0102030405060708090a0b0c0d0e0f101112");
    assert_eq!(hash.url_encode().len(), 60);
    assert!(hash.url_encode().starts_with("%00%ff"));
}
