//! MongoDB legacy wire protocol.
//!
//! - [`header`] - The 16-byte message header and opcode table
//! - [`ops`] - Per-opcode payload decoders and statement rendering
//! - [`dispatch`] - Frame classification

pub mod dispatch;
pub mod header;
pub mod ops;

pub use dispatch::{dispatch, DecodedFrame, Message};
pub use header::{MsgHeader, OpCode, HEADER_LEN};
pub use ops::{
    DeleteOp, GetMoreOp, InsertOp, KillCursorsOp, QueryOp, ReplySummary, RequestOp, UpdateOp,
};
