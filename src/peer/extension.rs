use super::error::PeerError;
use super::message::{EXTENSION, EXTENSION_HANDSHAKE};
use crate::bencode::{decode, encode, Value};
use crate::metainfo::InfoHash;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// The BEP-10 extension handshake: `m` maps extension names to the codes
/// the sender assigned locally.
#[derive(Debug, Clone, Default)]
pub struct ExtensionHandshake {
    pub extensions: BTreeMap<String, u8>,
    pub client: Option<String>,
}

impl ExtensionHandshake {
    pub fn with_extensions(extensions: &[(&str, u8)]) -> Self {
        let mut handshake = Self::default();
        for (name, code) in extensions {
            handshake.extensions.insert((*name).to_string(), *code);
        }
        handshake
    }

    pub fn encode(&self) -> Bytes {
        let mut m = BTreeMap::new();
        for (name, code) in &self.extensions {
            m.insert(
                Bytes::copy_from_slice(name.as_bytes()),
                Value::Integer(*code as i64),
            );
        }

        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"m"), Value::Dict(m));
        if let Some(client) = &self.client {
            dict.insert(Bytes::from_static(b"v"), Value::text(client));
        }
        Bytes::from(encode(&Value::Dict(dict)))
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        let value = decode(data)?;
        if value.as_dict().is_none() {
            return Err(PeerError::Extension("handshake is not a dict".into()));
        }

        let mut handshake = Self::default();
        if let Some(m) = value.get(b"m").and_then(Value::as_dict) {
            for (key, val) in m {
                if let (Ok(name), Some(code)) = (std::str::from_utf8(key), val.as_integer()) {
                    // Code zero disables an extension on the sender's side.
                    if (1..=255).contains(&code) {
                        handshake.extensions.insert(name.to_string(), code as u8);
                    }
                }
            }
        }
        handshake.client = value.get_str(b"v").map(String::from);

        Ok(handshake)
    }

    pub fn code_for(&self, name: &str) -> Option<u8> {
        self.extensions.get(name).copied()
    }

    /// The full wire payload: `[20][0][bencoded handshake]`.
    pub fn to_frame(&self) -> Bytes {
        let body = self.encode();
        let mut frame = BytesMut::with_capacity(2 + body.len());
        frame.put_u8(EXTENSION);
        frame.put_u8(EXTENSION_HANDSHAKE);
        frame.put_slice(&body);
        frame.freeze()
    }
}

/// The `bs_metadata` gossip payload: the sender's current info-hash, its
/// revision, and the port it listens on. `sig` is carried for forward
/// compatibility and is never populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IhMessage {
    pub info_hash: Option<InfoHash>,
    pub rev: String,
    pub port: u16,
    pub sig: String,
}

impl IhMessage {
    pub fn new(info_hash: Option<InfoHash>, rev: String, port: u16) -> Self {
        Self {
            info_hash,
            rev,
            port,
            sig: String::new(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let hash_bytes = match &self.info_hash {
            Some(hash) => Bytes::copy_from_slice(hash.as_bytes()),
            None => Bytes::new(),
        };

        let mut info = BTreeMap::new();
        info.insert(Bytes::from_static(b"infohash"), Value::Bytes(hash_bytes));
        info.insert(Bytes::from_static(b"rev"), Value::text(&self.rev));

        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"info"), Value::Dict(info));
        dict.insert(Bytes::from_static(b"port"), Value::Integer(self.port as i64));
        dict.insert(Bytes::from_static(b"sig"), Value::text(&self.sig));
        Bytes::from(encode(&Value::Dict(dict)))
    }

    pub fn decode(data: &[u8]) -> Result<Self, PeerError> {
        let value = decode(data)?;
        let info = value
            .get(b"info")
            .ok_or_else(|| PeerError::Extension("missing info".into()))?;

        let hash_bytes = info.get_bytes(b"infohash").unwrap_or_default();
        let info_hash = match hash_bytes.len() {
            0 => None,
            20 => Some(
                InfoHash::from_slice(hash_bytes)
                    .map_err(|_| PeerError::Extension("bad infohash".into()))?,
            ),
            n => return Err(PeerError::Extension(format!("infohash of {n} bytes"))),
        };

        let rev = info.get_str(b"rev").unwrap_or_default().to_string();
        let port = value
            .get_int(b"port")
            .filter(|p| (0..=u16::MAX as i64).contains(p))
            .unwrap_or(0) as u16;
        let sig = value.get_str(b"sig").unwrap_or_default().to_string();

        Ok(Self {
            info_hash,
            rev,
            port,
            sig,
        })
    }

    /// The full wire payload using the code the receiver assigned to
    /// `bs_metadata`: `[20][code][bencoded message]`.
    pub fn to_frame(&self, code: u8) -> Bytes {
        let body = self.encode();
        let mut frame = BytesMut::with_capacity(2 + body.len());
        frame.put_u8(EXTENSION);
        frame.put_u8(code);
        frame.put_slice(&body);
        frame.freeze()
    }
}
