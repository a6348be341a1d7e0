//! Standard message header shared by every wire frame.
//!
//! ```text
//! ┌───────────────┬───────────┬────────────┬─────────┐
//! │ messageLength │ requestID │ responseTo │ opCode  │
//! │ int32 LE      │ int32 LE  │ int32 LE   │ int32 LE│
//! └───────────────┴───────────┴────────────┴─────────┘
//! ```

use std::fmt;

use crate::error::DecodeError;

/// Header size in bytes.
pub const HEADER_LEN: usize = 16;

/// Operation classifier carried at offset 12 of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Reply,
    Message,
    Update,
    Insert,
    Reserved,
    Query,
    GetMore,
    Delete,
    KillCursors,
    /// Any value outside the legacy opcode set
    Unknown(i32),
}

impl OpCode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            1 => OpCode::Reply,
            1000 => OpCode::Message,
            2001 => OpCode::Update,
            2002 => OpCode::Insert,
            2003 => OpCode::Reserved,
            2004 => OpCode::Query,
            2005 => OpCode::GetMore,
            2006 => OpCode::Delete,
            2007 => OpCode::KillCursors,
            other => OpCode::Unknown(other),
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Message => 1000,
            OpCode::Update => 2001,
            OpCode::Insert => 2002,
            OpCode::Reserved => 2003,
            OpCode::Query => 2004,
            OpCode::GetMore => 2005,
            OpCode::Delete => 2006,
            OpCode::KillCursors => 2007,
            OpCode::Unknown(v) => *v,
        }
    }

    /// Opcodes whose frames open a pending request awaiting a reply.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            OpCode::Query | OpCode::Insert | OpCode::Update | OpCode::Delete | OpCode::GetMore
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpCode::Reply => "OP_REPLY",
            OpCode::Message => "OP_MSG_LEGACY",
            OpCode::Update => "OP_UPDATE",
            OpCode::Insert => "OP_INSERT",
            OpCode::Reserved => "RESERVED",
            OpCode::Query => "OP_QUERY",
            OpCode::GetMore => "OP_GET_MORE",
            OpCode::Delete => "OP_DELETE",
            OpCode::KillCursors => "OP_KILL_CURSORS",
            OpCode::Unknown(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Unknown(v) => write!(f, "UNKNOWN({v})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Decoded message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHeader {
    /// Total frame size including this header (validation only)
    pub message_length: i32,
    pub request_id: i32,
    /// `request_id` of the frame being answered; 0 for requests
    pub response_to: i32,
    pub op_code: OpCode,
}

impl MsgHeader {
    /// Decode the header from the first 16 bytes of `frame`.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        if frame.len() < HEADER_LEN {
            return Err(DecodeError::FrameTooShort { len: frame.len() });
        }
        Ok(MsgHeader {
            message_length: read_i32(frame, 0),
            request_id: read_i32(frame, 4),
            response_to: read_i32(frame, 8),
            op_code: OpCode::from_i32(read_i32(frame, 12)),
        })
    }

    /// Encode into the 16-byte wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&self.message_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.request_id.to_le_bytes());
        out[8..12].copy_from_slice(&self.response_to.to_le_bytes());
        out[12..16].copy_from_slice(&self.op_code.as_i32().to_le_bytes());
        out
    }

    /// Whether the declared length matches the captured frame size.
    pub fn length_matches(&self, frame_len: usize) -> bool {
        usize::try_from(self.message_length).map_or(false, |len| len == frame_len)
    }
}

#[inline]
fn read_i32(b: &[u8], pos: usize) -> i32 {
    i32::from_le_bytes([b[pos], b[pos + 1], b[pos + 2], b[pos + 3]])
}
