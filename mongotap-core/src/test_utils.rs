//! Test utilities for building wire traffic.
//!
//! Provides builders for BSON documents, operation payloads, complete wire
//! frames, Ethernet/IPv4/TCP packets and legacy PCAP files.

use ::bson::oid::ObjectId;
use ::bson::{Bson, DateTime, Timestamp};

use crate::bson::{Document, Value};
use crate::wire::{MsgHeader, OpCode, HEADER_LEN};

/// Builder for BSON documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    doc: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.doc.push(key, value);
        self
    }

    pub fn string(self, key: &str, value: &str) -> Self {
        self.value(key, Value::String(value.to_string()))
    }

    pub fn int32(self, key: &str, value: i32) -> Self {
        self.value(key, Value::Integer(value as i64))
    }

    /// Integers that do not fit in an int32 are encoded as int64.
    pub fn int64(self, key: &str, value: i64) -> Self {
        self.value(key, Value::Integer(value))
    }

    pub fn double(self, key: &str, value: f64) -> Self {
        self.value(key, Value::Float(value))
    }

    pub fn boolean(self, key: &str, value: bool) -> Self {
        self.value(key, Value::Boolean(value))
    }

    pub fn null(self, key: &str) -> Self {
        self.value(key, Value::Null)
    }

    pub fn object_id(self, key: &str, oid: [u8; 12]) -> Self {
        self.value(key, Value::ObjectId(oid))
    }

    pub fn datetime(self, key: &str, millis: i64) -> Self {
        self.value(key, Value::DateTime(millis))
    }

    pub fn timestamp(self, key: &str, seconds: u32, increment: u32) -> Self {
        self.value(key, Value::Timestamp { seconds, increment })
    }

    pub fn document(self, key: &str, doc: Document) -> Self {
        self.value(key, Value::Document(doc))
    }

    pub fn array(self, key: &str, items: Vec<Value>) -> Self {
        self.value(key, Value::Array(items))
    }

    pub fn build(self) -> Document {
        self.doc
    }
}

/// Encode a document into BSON bytes with the `bson` crate.
///
/// Integers that fit in 32 bits are written as int32.
///
/// # Panics
///
/// On [`Value::Unknown`] tags that carry a payload, since their contents
/// were never decoded.
pub fn encode_document(doc: &Document) -> Vec<u8> {
    ::bson::to_vec(&to_bson_document(doc)).expect("BSON document serializes")
}

fn to_bson_document(doc: &Document) -> ::bson::Document {
    doc.iter()
        .map(|(key, value)| (key.to_string(), to_bson(value)))
        .collect()
}

fn to_bson(value: &Value) -> Bson {
    match value {
        Value::String(s) => Bson::String(s.clone()),
        Value::Integer(n) => match i32::try_from(*n) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(*n),
        },
        Value::Float(f) => Bson::Double(*f),
        Value::Boolean(b) => Bson::Boolean(*b),
        Value::Null => Bson::Null,
        Value::Timestamp { seconds, increment } => Bson::Timestamp(Timestamp {
            time: *seconds,
            increment: *increment,
        }),
        Value::DateTime(ms) => Bson::DateTime(DateTime::from_millis(*ms)),
        Value::ObjectId(oid) => Bson::ObjectId(ObjectId::from_bytes(*oid)),
        Value::Document(doc) => Bson::Document(to_bson_document(doc)),
        Value::Array(items) => Bson::Array(items.iter().map(to_bson).collect()),
        Value::Unknown(0x06) => Bson::Undefined,
        Value::Unknown(0xFF) => Bson::MinKey,
        Value::Unknown(0x7F) => Bson::MaxKey,
        Value::Unknown(tag) => panic!("cannot encode opaque BSON type 0x{tag:02x}"),
    }
}

/// Builder for operation payloads (the bytes after the message header).
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    op_code: OpCode,
    bytes: Vec<u8>,
}

impl PayloadBuilder {
    /// Raw payload for an arbitrary opcode.
    pub fn raw(op_code: OpCode, bytes: Vec<u8>) -> Self {
        Self { op_code, bytes }
    }

    pub fn query(collection: &str, query: &Document) -> Self {
        Self::query_with(collection, 0, 0, query, None)
    }

    pub fn query_with(
        collection: &str,
        number_to_skip: i32,
        number_to_return: i32,
        query: &Document,
        field_selector: Option<&Document>,
    ) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        push_cstring(&mut bytes, collection);
        bytes.extend_from_slice(&number_to_skip.to_le_bytes());
        bytes.extend_from_slice(&number_to_return.to_le_bytes());
        bytes.extend_from_slice(&encode_document(query));
        if let Some(selector) = field_selector {
            bytes.extend_from_slice(&encode_document(selector));
        }
        Self::raw(OpCode::Query, bytes)
    }

    pub fn insert(collection: &str, documents: &[Document]) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        push_cstring(&mut bytes, collection);
        for doc in documents {
            bytes.extend_from_slice(&encode_document(doc));
        }
        Self::raw(OpCode::Insert, bytes)
    }

    pub fn update(collection: &str, flags: i32, selector: &Document, update: &Document) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        push_cstring(&mut bytes, collection);
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&encode_document(selector));
        bytes.extend_from_slice(&encode_document(update));
        Self::raw(OpCode::Update, bytes)
    }

    pub fn delete(collection: &str, selector: &Document) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        push_cstring(&mut bytes, collection);
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&encode_document(selector));
        Self::raw(OpCode::Delete, bytes)
    }

    pub fn get_more(collection: &str, number_to_return: i32, cursor_id: i64) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        push_cstring(&mut bytes, collection);
        bytes.extend_from_slice(&number_to_return.to_le_bytes());
        bytes.extend_from_slice(&cursor_id.to_le_bytes());
        Self::raw(OpCode::GetMore, bytes)
    }

    pub fn kill_cursors(cursor_ids: &[i64]) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(cursor_ids.len() as i32).to_le_bytes());
        for id in cursor_ids {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        Self::raw(OpCode::KillCursors, bytes)
    }

    pub fn reply(documents: &[Document]) -> Self {
        let mut bytes = 0i32.to_le_bytes().to_vec(); // responseFlags
        bytes.extend_from_slice(&0i64.to_le_bytes()); // cursorID
        bytes.extend_from_slice(&0i32.to_le_bytes()); // startingFrom
        bytes.extend_from_slice(&(documents.len() as i32).to_le_bytes());
        for doc in documents {
            bytes.extend_from_slice(&encode_document(doc));
        }
        Self::raw(OpCode::Reply, bytes)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    /// Prepend a header with a correct `messageLength`.
    pub fn frame(self, request_id: i32, response_to: i32) -> Vec<u8> {
        let header = MsgHeader {
            message_length: (HEADER_LEN + self.bytes.len()) as i32,
            request_id,
            response_to,
            op_code: self.op_code,
        };
        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&self.bytes);
        frame
    }
}

fn push_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Builder for an Ethernet/IPv4/TCP packet carrying `payload`.
#[derive(Debug, Clone)]
pub struct TcpPacketBuilder {
    src_ip: [u8; 4],
    dst_ip: [u8; 4],
    src_port: u16,
    dst_port: u16,
    payload: Vec<u8>,
}

impl Default for TcpPacketBuilder {
    fn default() -> Self {
        Self {
            src_ip: [10, 0, 0, 5],
            dst_ip: [10, 0, 0, 9],
            src_port: 50123,
            dst_port: 27017,
            payload: Vec::new(),
        }
    }
}

impl TcpPacketBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client to server direction with default addresses.
    pub fn to_server(payload: Vec<u8>) -> Self {
        Self::default().payload(payload)
    }

    /// Server to client direction with default addresses.
    pub fn to_client(payload: Vec<u8>) -> Self {
        let d = Self::default();
        Self {
            src_ip: d.dst_ip,
            dst_ip: d.src_ip,
            src_port: d.dst_port,
            dst_port: d.src_port,
            payload,
        }
    }

    pub fn src_ip(mut self, ip: [u8; 4]) -> Self {
        self.src_ip = ip;
        self
    }

    pub fn dst_ip(mut self, ip: [u8; 4]) -> Self {
        self.dst_ip = ip;
        self
    }

    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    pub fn dst_port(mut self, port: u16) -> Self {
        self.dst_port = port;
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(54 + self.payload.len());

        // Ethernet
        packet.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]); // Dst MAC
        packet.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]); // Src MAC
        packet.extend_from_slice(&[0x08, 0x00]); // IPv4

        // IPv4
        let total_length = (20 + 20 + self.payload.len()) as u16;
        packet.push(0x45); // Version 4, IHL 5
        packet.push(0x00);
        packet.extend_from_slice(&total_length.to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x01]); // Identification
        packet.extend_from_slice(&[0x40, 0x00]); // Don't fragment
        packet.push(64); // TTL
        packet.push(6); // TCP
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum (not calculated)
        packet.extend_from_slice(&self.src_ip);
        packet.extend_from_slice(&self.dst_ip);

        // TCP
        packet.extend_from_slice(&self.src_port.to_be_bytes());
        packet.extend_from_slice(&self.dst_port.to_be_bytes());
        packet.extend_from_slice(&1u32.to_be_bytes()); // Seq
        packet.extend_from_slice(&1u32.to_be_bytes()); // Ack
        packet.push(0x50); // Data offset 5
        packet.push(0x18); // PSH|ACK
        packet.extend_from_slice(&65535u16.to_be_bytes()); // Window
        packet.extend_from_slice(&[0x00, 0x00]); // Checksum
        packet.extend_from_slice(&[0x00, 0x00]); // Urgent pointer

        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Builder for a little-endian, microsecond legacy PCAP file.
#[derive(Debug, Clone)]
pub struct PcapFileBuilder {
    link_type: u32,
    data: Vec<u8>,
}

impl Default for PcapFileBuilder {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PcapFileBuilder {
    pub fn new(link_type: u32) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(&[0xd4, 0xc3, 0xb2, 0xa1]); // Magic (little endian)
        data.extend_from_slice(&[0x02, 0x00]); // Version major (2)
        data.extend_from_slice(&[0x04, 0x00]); // Version minor (4)
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Thiszone
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]); // Sigfigs
        data.extend_from_slice(&[0xff, 0xff, 0x00, 0x00]); // Snaplen (65535)
        data.extend_from_slice(&link_type.to_le_bytes());
        Self { link_type, data }
    }

    pub fn link_type(&self) -> u32 {
        self.link_type
    }

    /// Append a packet captured at `timestamp_us`.
    pub fn packet(mut self, timestamp_us: i64, packet: &[u8]) -> Self {
        let ts_sec = (timestamp_us / 1_000_000) as u32;
        let ts_usec = (timestamp_us % 1_000_000) as u32;
        let len = packet.len() as u32;
        self.data.extend_from_slice(&ts_sec.to_le_bytes());
        self.data.extend_from_slice(&ts_usec.to_le_bytes());
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(&len.to_le_bytes());
        self.data.extend_from_slice(packet);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}
