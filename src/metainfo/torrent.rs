use super::error::MetainfoError;
use super::info_hash::InfoHash;
use super::magnet::MagnetLink;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A parsed torrent descriptor.
///
/// `info` is absent for magnet sources, where only the info-hash is known
/// until the metadata is fetched from the swarm.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub info: Option<Info>,
    /// SHA-1 over the canonical bencoding of the `info` dictionary.
    pub info_hash: InfoHash,
    pub announce: Option<String>,
    /// Tiered fallback trackers (BEP-12).
    pub announce_list: Vec<Vec<String>>,
    pub creation_date: Option<i64>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub encoding: Option<String>,
    raw_info: Bytes,
}

/// The `info` dictionary: piece layout plus the file list.
#[derive(Debug, Clone)]
pub struct Info {
    pub name: String,
    pub piece_length: u64,
    /// One 20-byte SHA-1 digest per piece.
    pub pieces: Vec<[u8; 20]>,
    /// Always non-empty; single-file torrents get one synthetic entry named
    /// after the torrent.
    pub files: Vec<File>,
    pub total_length: u64,
    pub private: bool,
}

/// One file within a torrent, with its byte offset in the logical stream.
#[derive(Debug, Clone)]
pub struct File {
    /// Path relative to the store root, rooted at the torrent name.
    pub path: PathBuf,
    pub length: u64,
    pub offset: u64,
}

impl Metainfo {
    /// Resolves a source designator: an `http(s):` URL, a `magnet:` URI,
    /// raw bencoded content, or a filesystem path, in that order. A string
    /// that is both valid content and a valid path resolves as content.
    pub async fn load(source: &str) -> Result<Self, MetainfoError> {
        if source.starts_with("http:") || source.starts_with("https:") {
            let body = reqwest::get(source).await?.bytes().await?;
            return Self::from_bytes(&body);
        }
        if source.starts_with("magnet:") {
            let magnet = MagnetLink::parse(source)?;
            return Ok(Self::from_magnet(&magnet));
        }
        match Self::from_bytes(source.as_bytes()) {
            Ok(parsed) => Ok(parsed),
            Err(_) => {
                let content = tokio::fs::read(source).await?;
                Self::from_bytes(&content)
            }
        }
    }

    /// Parses a full descriptor from raw bencoded bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        let root = decode(data)?;
        if root.as_dict().is_none() {
            return Err(MetainfoError::InvalidField("root"));
        }

        let info_value = root
            .get(b"info")
            .ok_or(MetainfoError::MissingField("info"))?;
        let raw_info = Bytes::from(encode(info_value));
        let info_hash = InfoHash::from_info_bytes(&raw_info);
        let info = parse_info(info_value)?;

        let announce = root.get_str(b"announce").map(String::from);

        let announce_list = root
            .get_list(b"announce-list")
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(Value::as_list)
                    .map(|tier| {
                        tier.iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        let creation_date = root.get_int(b"creation date");
        let comment = root.get_str(b"comment").map(String::from);
        let created_by = root.get_str(b"created by").map(String::from);
        let encoding = root.get_str(b"encoding").map(String::from);

        Ok(Self {
            info: Some(info),
            info_hash,
            announce,
            announce_list,
            creation_date,
            comment,
            created_by,
            encoding,
            raw_info,
        })
    }

    /// A descriptor stub carrying only what a magnet URI provides.
    pub fn from_magnet(magnet: &MagnetLink) -> Self {
        let announce_list = if magnet.trackers.is_empty() {
            Vec::new()
        } else {
            vec![magnet.trackers.clone()]
        };
        Self {
            info: None,
            info_hash: magnet.info_hash,
            announce: None,
            announce_list,
            creation_date: None,
            comment: None,
            created_by: None,
            encoding: None,
            raw_info: Bytes::new(),
        }
    }

    /// The canonical bencoded `info` bytes, as hashed for the info-hash.
    pub fn raw_info(&self) -> &Bytes {
        &self.raw_info
    }

    /// Primary announce first, then announce-list entries, deduplicated.
    pub fn trackers(&self) -> Vec<String> {
        let mut urls = Vec::new();
        if let Some(announce) = &self.announce {
            urls.push(announce.clone());
        }
        for tier in &self.announce_list {
            for url in tier {
                if !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
        urls
    }

    /// Writes the bencoded descriptor to `{dir}/{hex-info-hash}`.
    pub async fn save_to_disk(&self, dir: &Path) -> Result<(), MetainfoError> {
        let value = self.to_value()?;
        let path = dir.join(self.info_hash.to_hex());
        tokio::fs::write(path, encode(&value)).await?;
        Ok(())
    }

    fn to_value(&self) -> Result<Value, MetainfoError> {
        if self.raw_info.is_empty() {
            return Err(MetainfoError::MissingField("info"));
        }
        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"info"), decode(&self.raw_info)?);
        if let Some(announce) = &self.announce {
            dict.insert(Bytes::from_static(b"announce"), Value::text(announce));
        }
        if !self.announce_list.is_empty() {
            let tiers = self
                .announce_list
                .iter()
                .map(|tier| Value::List(tier.iter().map(|u| Value::text(u)).collect()))
                .collect();
            dict.insert(Bytes::from_static(b"announce-list"), Value::List(tiers));
        }
        if let Some(date) = self.creation_date {
            dict.insert(Bytes::from_static(b"creation date"), Value::Integer(date));
        }
        if let Some(comment) = &self.comment {
            dict.insert(Bytes::from_static(b"comment"), Value::text(comment));
        }
        if let Some(created_by) = &self.created_by {
            dict.insert(Bytes::from_static(b"created by"), Value::text(created_by));
        }
        if let Some(encoding) = &self.encoding {
            dict.insert(Bytes::from_static(b"encoding"), Value::text(encoding));
        }
        Ok(Value::Dict(dict))
    }
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    if value.as_dict().is_none() {
        return Err(MetainfoError::InvalidField("info"));
    }

    let name = value
        .get_str(b"name")
        .ok_or(MetainfoError::MissingField("name"))?
        .to_string();

    let piece_length = value
        .get_int(b"piece length")
        .ok_or(MetainfoError::MissingField("piece length"))?;
    if piece_length <= 0 {
        return Err(MetainfoError::InvalidField("piece length"));
    }

    let pieces_raw = value
        .get_bytes(b"pieces")
        .ok_or(MetainfoError::MissingField("pieces"))?;
    if pieces_raw.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }
    let pieces = pieces_raw
        .chunks_exact(20)
        .map(|chunk| {
            let mut digest = [0u8; 20];
            digest.copy_from_slice(chunk);
            digest
        })
        .collect();

    let private = value.get_int(b"private") == Some(1);

    let length_field = value.get_int(b"length");
    let files_field = value.get_list(b"files");

    let files = match (length_field, files_field) {
        (Some(_), Some(list)) if !list.is_empty() => {
            return Err(MetainfoError::InvalidField("length and files"));
        }
        (Some(length), _) => {
            if length < 0 {
                return Err(MetainfoError::InvalidField("length"));
            }
            vec![File {
                path: PathBuf::from(&name),
                length: length as u64,
                offset: 0,
            }]
        }
        (None, Some(list)) => parse_file_list(&name, list)?,
        (None, None) => return Err(MetainfoError::MissingField("length or files")),
    };

    let total_length = files.iter().map(|f| f.length).sum();

    Ok(Info {
        name,
        piece_length: piece_length as u64,
        pieces,
        files,
        total_length,
        private,
    })
}

fn parse_file_list(name: &str, list: &[Value]) -> Result<Vec<File>, MetainfoError> {
    let mut files = Vec::with_capacity(list.len());
    let mut offset = 0u64;

    for entry in list {
        if entry.as_dict().is_none() {
            return Err(MetainfoError::InvalidField("files"));
        }

        let length = entry
            .get_int(b"length")
            .ok_or(MetainfoError::MissingField("file length"))?;
        if length < 0 {
            return Err(MetainfoError::InvalidField("file length"));
        }

        let components = entry
            .get_list(b"path")
            .ok_or(MetainfoError::MissingField("file path"))?;

        let path: PathBuf = std::iter::once(name.to_string())
            .chain(
                components
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from),
            )
            .collect();

        files.push(File {
            path,
            length: length as u64,
            offset,
        });
        offset += length as u64;
    }

    if files.is_empty() {
        return Err(MetainfoError::InvalidField("files"));
    }
    Ok(files)
}
