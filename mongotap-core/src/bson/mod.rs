//! BSON documents as they appear inside wire frames.
//!
//! Only decoding is supported: captured documents are walked with the
//! `bson` crate's raw document reader, mapped into a [`Value`] tree and
//! rendered back into shell-like statement text by [`render`]. Element types
//! that carry no useful text (binary payloads, JavaScript, regular
//! expressions, ...) decode to [`Value::Unknown`] with their type tag so the
//! renderer can still emit a placeholder.

mod decode;
pub mod render;

pub use decode::{decode_document, read_document};
pub use render::{render_fields, Fields};

/// Maximum nesting depth accepted by the decoder.
pub const MAX_DEPTH: usize = 100;

/// Smallest valid document: length prefix plus terminating NUL.
pub const MIN_DOCUMENT_LEN: usize = 5;

/// A decoded BSON value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    /// int32 and int64 both widen to `i64`
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    /// Replication timestamp (seconds, ordinal)
    Timestamp { seconds: u32, increment: u32 },
    /// UTC datetime in milliseconds since the Unix epoch
    DateTime(i64),
    ObjectId([u8; 12]),
    Document(Document),
    Array(Vec<Value>),
    /// Element type we do not render, carrying its tag
    Unknown(u8),
}

/// An ordered BSON document. Field order is preserved exactly as decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping insertion order.
    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.fields.push((key.into(), value));
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.push(key, value);
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Document(doc)
    }
}
