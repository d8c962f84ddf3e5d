use bytes::Bytes;
use std::collections::BTreeMap;

use super::error::BencodeError;
use super::value::Value;

/// Recursion limit; real-world descriptors nest three or four levels deep.
const DEPTH_LIMIT: usize = 64;

/// Decodes exactly one bencode value from `input`.
///
/// Trailing bytes after the value are an error, as is any truncation or
/// malformed token.
pub fn decode(input: &[u8]) -> Result<Value, BencodeError> {
    let mut cur = Cursor { input, at: 0 };
    let value = cur.value(0)?;
    if cur.at != input.len() {
        return Err(BencodeError::TrailingBytes);
    }
    Ok(value)
}

/// Encodes a value to its canonical byte form.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                write_value(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(entries) => {
            out.push(b'd');
            for (key, val) in entries {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key);
                write_value(val, out);
            }
            out.push(b'e');
        }
    }
}

struct Cursor<'a> {
    input: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.at)
            .copied()
            .ok_or(BencodeError::Truncated(self.at))
    }

    fn bump(&mut self) {
        self.at += 1;
    }

    fn value(&mut self, depth: usize) -> Result<Value, BencodeError> {
        if depth > DEPTH_LIMIT {
            return Err(BencodeError::DepthExceeded);
        }
        match self.peek()? {
            b'i' => self.integer(),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => Ok(Value::Bytes(self.byte_string()?)),
            byte => Err(BencodeError::Unexpected { byte, at: self.at }),
        }
    }

    fn integer(&mut self) -> Result<Value, BencodeError> {
        let start = self.at;
        self.bump();
        let body_start = self.at;
        while self.peek()? != b'e' {
            self.bump();
        }
        let body = &self.input[body_start..self.at];
        self.bump();

        let text = std::str::from_utf8(body).map_err(|_| BencodeError::BadInteger(start))?;
        // "i-0e", "i03e", and an empty body are all invalid per BEP-3.
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        if digits.is_empty()
            || (digits.len() > 1 && digits.starts_with('0'))
            || (negative && digits == "0")
        {
            return Err(BencodeError::BadInteger(start));
        }
        let n: i64 = text.parse().map_err(|_| BencodeError::BadInteger(start))?;
        Ok(Value::Integer(n))
    }

    fn byte_string(&mut self) -> Result<Bytes, BencodeError> {
        let start = self.at;
        while self.peek()? != b':' {
            self.bump();
        }
        let len_text = std::str::from_utf8(&self.input[start..self.at])
            .map_err(|_| BencodeError::BadLength(start))?;
        let len: usize = len_text.parse().map_err(|_| BencodeError::BadLength(start))?;
        self.bump();

        let end = self
            .at
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or(BencodeError::Truncated(self.at))?;
        let bytes = Bytes::copy_from_slice(&self.input[self.at..end]);
        self.at = end;
        Ok(bytes)
    }

    fn list(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.bump();
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, BencodeError> {
        self.bump();
        let mut entries = BTreeMap::new();
        while self.peek()? != b'e' {
            let key_at = self.at;
            if !self.peek()?.is_ascii_digit() {
                return Err(BencodeError::NonStringKey(key_at));
            }
            let key = self.byte_string()?;
            let val = self.value(depth + 1)?;
            entries.insert(key, val);
        }
        self.bump();
        Ok(Value::Dict(entries))
    }
}
