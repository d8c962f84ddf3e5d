use super::*;
use bytes::Bytes;
use std::collections::BTreeMap;

#[test]
fn test_decode_integer() {
    assert_eq!(decode(b"i42e").unwrap(), Value::Integer(42));
    assert_eq!(decode(b"i-7e").unwrap(), Value::Integer(-7));
    assert_eq!(decode(b"i0e").unwrap(), Value::Integer(0));
}

#[test]
fn test_decode_rejects_malformed_integers() {
    assert!(matches!(decode(b"ie"), Err(BencodeError::BadInteger(_))));
    assert!(matches!(decode(b"i03e"), Err(BencodeError::BadInteger(_))));
    assert!(matches!(decode(b"i-0e"), Err(BencodeError::BadInteger(_))));
    assert!(matches!(decode(b"i12"), Err(BencodeError::Truncated(_))));
}

#[test]
fn test_decode_byte_string() {
    assert_eq!(decode(b"5:hello").unwrap().as_str(), Some("hello"));
    assert_eq!(decode(b"0:").unwrap().as_bytes(), Some(&b""[..]));
}

#[test]
fn test_decode_truncated_string() {
    assert!(matches!(decode(b"10:short"), Err(BencodeError::Truncated(_))));
    assert!(matches!(decode(b"5"), Err(BencodeError::Truncated(_))));
}

#[test]
fn test_decode_list_and_dict() {
    let list = decode(b"li1e3:twoe").unwrap();
    let items = list.as_list().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_integer(), Some(1));
    assert_eq!(items[1].as_str(), Some("two"));

    let dict = decode(b"d3:agei30e4:name5:alicee").unwrap();
    assert_eq!(dict.get_int(b"age"), Some(30));
    assert_eq!(dict.get_str(b"name"), Some("alice"));
    assert_eq!(dict.get(b"missing"), None);
}

#[test]
fn test_typed_lookups_discard_wrong_types() {
    let dict = decode(b"d4:porti42e3:rev2:1ae").unwrap();
    assert_eq!(dict.get_int(b"port"), Some(42));
    assert_eq!(dict.get_str(b"rev"), Some("1a"));

    // Type mismatches and non-dict receivers read as absent fields.
    assert_eq!(dict.get_str(b"port"), None);
    assert_eq!(dict.get_int(b"rev"), None);
    assert_eq!(dict.get_list(b"port"), None);
    assert_eq!(Value::Integer(1).get(b"port"), None);
    assert_eq!(Value::Integer(1).get_bytes(b"rev"), None);
}

#[test]
fn test_decode_rejects_trailing_bytes() {
    assert_eq!(decode(b"i1eextra"), Err(BencodeError::TrailingBytes));
}

#[test]
fn test_decode_rejects_non_string_key() {
    assert!(matches!(
        decode(b"di1ei2ee"),
        Err(BencodeError::NonStringKey(_))
    ));
}

#[test]
fn test_decode_depth_limit() {
    let mut deep = Vec::new();
    deep.extend(std::iter::repeat(b'l').take(100));
    deep.extend(std::iter::repeat(b'e').take(100));
    assert_eq!(decode(&deep), Err(BencodeError::DepthExceeded));
}

#[test]
fn test_encode_sorts_dict_keys() {
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"zz"), Value::Integer(1));
    dict.insert(Bytes::from_static(b"aa"), Value::Integer(2));
    assert_eq!(encode(&Value::Dict(dict)), b"d2:aai2e2:zzi1ee".to_vec());
}

#[test]
fn test_roundtrip_binary_safe() {
    let raw = Bytes::from_static(&[0u8, 1, 2, 0xff, 0xfe]);
    let mut dict = BTreeMap::new();
    dict.insert(Bytes::from_static(b"blob"), Value::Bytes(raw.clone()));
    dict.insert(Bytes::from_static(b"n"), Value::Integer(-99));
    let original = Value::Dict(dict);

    let encoded = encode(&original);
    assert_eq!(decode(&encoded).unwrap(), original);
}
