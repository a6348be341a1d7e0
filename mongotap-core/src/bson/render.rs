//! Render decoded documents as mongo-shell-like text.
//!
//! Output is compact: `key:value` pairs joined by commas with no spaces,
//! strings unquoted. The top-level document is rendered without braces so
//! that callers can wrap it (`ns.find({...})`).

use std::fmt::{self, Write};

use chrono::DateTime;

use super::{Document, Value, MAX_DEPTH};

/// Display adapter rendering a document's fields without surrounding braces.
pub struct Fields<'a>(pub &'a Document);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, self.0, 0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0)
    }
}

/// Render the top level of `doc` (no braces).
pub fn render_fields(doc: &Document) -> String {
    Fields(doc).to_string()
}

fn write_fields<W: Write>(out: &mut W, doc: &Document, depth: usize) -> fmt::Result {
    for (i, (key, value)) in doc.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        out.write_str(key)?;
        out.write_char(':')?;
        write_value(out, value, depth)?;
    }
    Ok(())
}

fn write_value<W: Write>(out: &mut W, value: &Value, depth: usize) -> fmt::Result {
    match value {
        Value::String(s) => out.write_str(s),
        Value::Integer(n) => write!(out, "{n}"),
        Value::Float(n) => write!(out, "{n}"),
        Value::Boolean(b) => write!(out, "{b}"),
        Value::Null => out.write_str("null"),
        Value::Timestamp { seconds, increment } => write!(out, "Timestamp({seconds},{increment})"),
        Value::DateTime(ms) => match DateTime::from_timestamp_millis(*ms) {
            Some(dt) => write!(out, "ISODate(\"{}\")", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ")),
            None => write!(out, "new Date({ms})"),
        },
        Value::ObjectId(oid) => write!(out, "ObjectId(\"{}\")", hex::encode(oid)),
        Value::Document(doc) => {
            if depth >= MAX_DEPTH {
                return out.write_str("{…}");
            }
            out.write_char('{')?;
            write_fields(out, doc, depth + 1)?;
            out.write_char('}')
        }
        Value::Array(items) => {
            if depth >= MAX_DEPTH {
                return out.write_str("[…]");
            }
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_char(',')?;
                }
                write_value(out, item, depth + 1)?;
            }
            out.write_char(']')
        }
        Value::Unknown(tag) => write!(out, "<bson type 0x{tag:02x}>"),
    }
}
