use bytes::Bytes;
use std::collections::BTreeMap;

/// A decoded bencode value.
///
/// Dictionaries are kept in a `BTreeMap` so re-encoding always emits keys in
/// the canonical sorted order, which is what info-hash computation relies on.
///
/// Most protocol payloads are dictionaries read field by field, so the
/// `get_*` lookups combine the key access with the type coercion; the plain
/// `as_*` views exist for the places that walk a value they already hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// A byte-string value from UTF-8 text.
    pub fn text(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// A byte-string value from raw bytes.
    pub fn blob(b: &[u8]) -> Self {
        Value::Bytes(Bytes::copy_from_slice(b))
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        if let Value::Bytes(b) = self {
            Some(b)
        } else {
            None
        }
    }

    /// The value as UTF-8 text, if it is a byte string holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()?).ok()
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(l) = self {
            Some(l)
        } else {
            None
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        if let Value::Dict(d) = self {
            Some(d)
        } else {
            None
        }
    }

    /// Dictionary lookup; `None` when the value is not a dictionary or the
    /// key is absent. The typed variants below also discard entries of the
    /// wrong type, which is how bencoded protocols treat unusable fields.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict()?.get(key)
    }

    pub fn get_int(&self, key: &[u8]) -> Option<i64> {
        self.get(key)?.as_integer()
    }

    pub fn get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        self.get(key)?.as_bytes()
    }

    pub fn get_str(&self, key: &[u8]) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_list(&self, key: &[u8]) -> Option<&[Value]> {
        self.get(key)?.as_list()
    }
}
