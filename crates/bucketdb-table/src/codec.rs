//! Record codec: `{"field":"value","field2":"value2"}`.
//!
//! No escaping. A quote inside a name or value would split the segment on
//! decode, so `encode` refuses such input instead of writing bytes that
//! later read back garbled. Entries are written in field-name order, which
//! makes the encoding of a given map deterministic.

use std::collections::BTreeMap;

use crate::error::{TableError, TableResult};

const OPEN: u8 = b'{';
const CLOSE: u8 = b'}';
const QUOTE: u8 = b'"';
const COLON: u8 = b':';
const COMMA: u8 = b',';

pub type Fields = BTreeMap<String, String>;

pub fn encode(fields: &Fields) -> TableResult<Vec<u8>> {
    let size: usize = fields.iter().map(|(k, v)| k.len() + v.len() + 6).sum();
    let mut buf = Vec::with_capacity(size + 2);

    buf.push(OPEN);
    for (i, (name, value)) in fields.iter().enumerate() {
        if name.as_bytes().contains(&QUOTE) || value.as_bytes().contains(&QUOTE) {
            return Err(TableError::UnencodableValue { field: name.clone() });
        }
        if i > 0 {
            buf.push(COMMA);
        }
        buf.push(QUOTE);
        buf.extend_from_slice(name.as_bytes());
        buf.push(QUOTE);
        buf.push(COLON);
        buf.push(QUOTE);
        buf.extend_from_slice(value.as_bytes());
        buf.push(QUOTE);
    }
    buf.push(CLOSE);
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> TableResult<Fields> {
    decode_keyed("", bytes)
}

/// `decode`, naming `key` in any `MalformedRecord` error.
pub(crate) fn decode_keyed(key: &str, bytes: &[u8]) -> TableResult<Fields> {
    let malformed = |reason: &str| TableError::MalformedRecord {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let text = std::str::from_utf8(bytes).map_err(|_| malformed("not valid UTF-8"))?;
    let inner = text
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| malformed("missing '{' or '}'"))?;

    // Every odd piece between quotes is a quoted segment
    let segments: Vec<&str> = inner.split('"').skip(1).step_by(2).collect();
    if inner.bytes().filter(|&b| b == QUOTE).count() % 2 != 0 {
        return Err(malformed("unbalanced quotes"));
    }
    if segments.len() % 2 != 0 {
        return Err(malformed("field without a value"));
    }

    Ok(segments
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect())
}
