use std::fmt;

use bson::raw::{RawArray, RawBsonRef, RawDocument};

use crate::error::DecodeError;

use super::{Document, Value, MAX_DEPTH, MIN_DOCUMENT_LEN};

/// Read one length-prefixed document from the front of `data`.
///
/// The first four bytes are the document's total length (little-endian,
/// including the prefix itself). Returns the decoded document and the
/// number of bytes it occupied.
pub fn read_document(data: &[u8]) -> Result<(Document, usize), DecodeError> {
    let len = declared_length(data)?;
    let raw = RawDocument::from_bytes(&data[..len]).map_err(malformed)?;
    Ok((map_document(raw, 0)?, len))
}

/// Decode a buffer holding exactly one document.
///
/// Trailing bytes after the declared length are ignored.
pub fn decode_document(data: &[u8]) -> Result<Document, DecodeError> {
    read_document(data).map(|(doc, _)| doc)
}

/// Validate the length prefix against the bytes actually available.
fn declared_length(data: &[u8]) -> Result<usize, DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::Truncated {
            field: "document length",
            needed: 4,
            have: data.len(),
        });
    }
    let declared = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if declared < MIN_DOCUMENT_LEN as i32 || declared as usize > data.len() {
        return Err(DecodeError::DocumentLengthOverrun {
            declared: declared as i64,
            available: data.len(),
        });
    }
    Ok(declared as usize)
}

// The raw reader only validates a nested document when it is iterated, so
// the depth check has to run before descending.
fn map_document(doc: &RawDocument, depth: usize) -> Result<Document, DecodeError> {
    check_depth(depth)?;
    let mut out = Document::new();
    for element in doc {
        let (key, value) = element.map_err(malformed)?;
        out.push(key, map_value(value, depth)?);
    }
    Ok(out)
}

fn map_array(array: &RawArray, depth: usize) -> Result<Vec<Value>, DecodeError> {
    check_depth(depth)?;
    array
        .into_iter()
        .map(|item| map_value(item.map_err(malformed)?, depth))
        .collect()
}

fn map_value(value: RawBsonRef<'_>, depth: usize) -> Result<Value, DecodeError> {
    Ok(match value {
        RawBsonRef::Double(n) => Value::Float(n),
        RawBsonRef::String(s) => Value::String(s.to_owned()),
        RawBsonRef::Document(doc) => Value::Document(map_document(doc, depth + 1)?),
        RawBsonRef::Array(array) => Value::Array(map_array(array, depth + 1)?),
        RawBsonRef::Boolean(b) => Value::Boolean(b),
        RawBsonRef::Null => Value::Null,
        RawBsonRef::Int32(n) => Value::Integer(n.into()),
        RawBsonRef::Int64(n) => Value::Integer(n),
        RawBsonRef::Timestamp(ts) => Value::Timestamp {
            seconds: ts.time,
            increment: ts.increment,
        },
        RawBsonRef::DateTime(dt) => Value::DateTime(dt.timestamp_millis()),
        RawBsonRef::ObjectId(oid) => Value::ObjectId(oid.bytes()),
        // binary, regex, code, symbol, decimal128, min/max key, ...
        other => Value::Unknown(other.element_type() as u8),
    })
}

fn check_depth(depth: usize) -> Result<(), DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeeplyNested { limit: MAX_DEPTH });
    }
    Ok(())
}

fn malformed(err: impl fmt::Display) -> DecodeError {
    DecodeError::malformed(err.to_string())
}
