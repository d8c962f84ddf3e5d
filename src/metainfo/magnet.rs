use super::error::MetainfoError;
use super::info_hash::InfoHash;
use std::collections::HashMap;

/// A parsed magnet URI (BEP-9).
///
/// Only the info-hash is required; a magnet source yields a descriptor stub
/// until the metadata arrives from the swarm.
#[derive(Debug, Clone)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

impl MagnetLink {
    /// Parses `magnet:?xt=urn:btih:<hash>` URIs with the hash in 40-char
    /// hex or 32-char base32 form, plus optional `dn` and `tr` parameters.
    pub fn parse(uri: &str) -> Result<Self, MetainfoError> {
        let query = uri
            .strip_prefix("magnet:?")
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing magnet:? prefix".into()))?;
        let params = parse_query_string(query);

        let xt = params
            .get("xt")
            .and_then(|v| v.first())
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("missing xt parameter".into()))?;

        let hash = xt
            .strip_prefix("urn:btih:")
            .ok_or_else(|| MetainfoError::InvalidMagnetLink("unsupported xt form".into()))?;

        let info_hash = match hash.len() {
            40 => InfoHash::from_hex(hash)?,
            32 => {
                let raw = base32_decode(hash)
                    .ok_or_else(|| MetainfoError::InvalidMagnetLink("invalid base32".into()))?;
                InfoHash::from_slice(&raw)?
            }
            _ => {
                return Err(MetainfoError::InvalidMagnetLink(
                    "invalid info hash length".into(),
                ))
            }
        };

        let display_name = params
            .get("dn")
            .and_then(|v| v.first())
            .map(|s| url_decode(s));

        let trackers = params
            .get("tr")
            .map(|v| v.iter().map(|s| url_decode(s)).collect())
            .unwrap_or_default();

        Ok(Self {
            info_hash,
            display_name,
            trackers,
        })
    }
}

fn parse_query_string(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for part in query.split('&') {
        if let Some((key, value)) = part.split_once('=') {
            params.entry(key.to_string()).or_default().push(value.to_string());
        }
    }
    params
}

/// Percent-decoding over raw bytes: a non-ASCII character arrives as a run
/// of escapes (`%E2%9C%93`), so the bytes are collected first and only
/// interpreted as UTF-8 once the whole value is assembled.
fn url_decode(s: &str) -> String {
    let raw = s.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let decoded = raw
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(if raw[i] == b'+' { b' ' } else { raw[i] });
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn base32_decode(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

    let input = input.to_uppercase();
    let input = input.trim_end_matches('=');

    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut acc: u64 = 0;
    let mut bits = 0;
    for c in input.chars() {
        let value = ALPHABET.iter().position(|&x| x == c as u8)? as u64;
        acc = (acc << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}
