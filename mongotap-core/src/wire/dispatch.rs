//! Frame classification.
//!
//! [`dispatch`] decodes the header of one captured frame and routes the
//! payload to the decoder for its opcode. It has no side effects: the
//! caller decides what to log and what to correlate.

use super::header::{MsgHeader, OpCode, HEADER_LEN};
use super::ops::{
    DeleteOp, GetMoreOp, InsertOp, KillCursorsOp, QueryOp, ReplySummary, RequestOp, UpdateOp,
};
use crate::error::DecodeError;

/// Decoded payload of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Query(QueryOp),
    Insert(InsertOp),
    Update(UpdateOp),
    Delete(DeleteOp),
    GetMore(GetMoreOp),
    KillCursors(KillCursorsOp),
    /// Reply; the summary is `None` when the payload is shorter than its fixed fields.
    Reply(Option<ReplySummary>),
    /// Opcode without a decoder. The payload is kept unrendered.
    Unhandled { payload_len: usize },
}

impl Message {
    /// The request view of this message, for opcodes that open a pending entry.
    pub fn as_request(&self) -> Option<&dyn RequestOp> {
        match self {
            Message::Query(op) => Some(op),
            Message::Insert(op) => Some(op),
            Message::Update(op) => Some(op),
            Message::Delete(op) => Some(op),
            Message::GetMore(op) => Some(op),
            Message::KillCursors(_) | Message::Reply(_) | Message::Unhandled { .. } => None,
        }
    }
}

/// A frame whose header and payload both decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub header: MsgHeader,
    pub message: Message,
}

/// Decode one raw frame.
pub fn dispatch(frame: &[u8]) -> Result<DecodedFrame, DecodeError> {
    let header = MsgHeader::decode(frame)?;
    let payload = &frame[HEADER_LEN..];

    let message = match header.op_code {
        OpCode::Query => Message::Query(QueryOp::decode(payload)?),
        OpCode::Insert => Message::Insert(InsertOp::decode(payload)?),
        OpCode::Update => Message::Update(UpdateOp::decode(payload)?),
        OpCode::Delete => Message::Delete(DeleteOp::decode(payload)?),
        OpCode::GetMore => Message::GetMore(GetMoreOp::decode(payload)?),
        OpCode::KillCursors => Message::KillCursors(KillCursorsOp::decode(payload)?),
        OpCode::Reply => Message::Reply(ReplySummary::decode(payload)),
        OpCode::Message | OpCode::Reserved | OpCode::Unknown(_) => Message::Unhandled {
            payload_len: payload.len(),
        },
    };

    Ok(DecodedFrame { header, message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson::Document;
    use crate::test_utils::{DocumentBuilder, PayloadBuilder};

    #[test]
    fn test_dispatch_query_frame() {
        let frame = PayloadBuilder::query("test.cmd", &Document::new()).frame(189, 0);
        let decoded = dispatch(&frame).unwrap();

        assert_eq!(decoded.header.request_id, 189);
        let request = decoded.message.as_request().unwrap();
        assert_eq!(request.collection(), "test.cmd");
        assert_eq!(request.statement(), "test.cmd.find()");
    }

    #[test]
    fn test_dispatch_short_frame() {
        assert_eq!(
            dispatch(&[1, 2, 3]).unwrap_err(),
            DecodeError::FrameTooShort { len: 3 }
        );
    }

    #[test]
    fn test_dispatch_reply() {
        let frame = PayloadBuilder::reply(&[Document::new(), Document::new()]).frame(5, 189);
        let decoded = dispatch(&frame).unwrap();

        assert_eq!(decoded.header.response_to, 189);
        match decoded.message {
            Message::Reply(Some(summary)) => assert_eq!(summary.number_returned, 2),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_short_reply_still_a_reply() {
        let frame = PayloadBuilder::raw(OpCode::Reply, vec![0; 4]).frame(5, 1);
        let decoded = dispatch(&frame).unwrap();
        assert_eq!(decoded.message, Message::Reply(None));
        assert!(decoded.message.as_request().is_none());
    }

    #[test]
    fn test_dispatch_unknown_opcode_keeps_payload_length() {
        let frame = PayloadBuilder::raw(OpCode::Unknown(2013), vec![0xAB; 9]).frame(1, 0);
        let decoded = dispatch(&frame).unwrap();
        assert_eq!(decoded.header.op_code, OpCode::Unknown(2013));
        assert_eq!(decoded.message, Message::Unhandled { payload_len: 9 });
    }

    #[test]
    fn test_dispatch_legacy_message_is_unhandled() {
        let frame = PayloadBuilder::raw(OpCode::Message, b"hello\0".to_vec()).frame(1, 0);
        assert!(matches!(
            dispatch(&frame).unwrap().message,
            Message::Unhandled { payload_len: 6 }
        ));
    }

    #[test]
    fn test_dispatch_kill_cursors_is_not_a_request() {
        let frame = PayloadBuilder::kill_cursors(&[7, 8]).frame(3, 0);
        let decoded = dispatch(&frame).unwrap();
        assert_eq!(
            decoded.message,
            Message::KillCursors(KillCursorsOp { cursor_count: 2 })
        );
        assert!(decoded.message.as_request().is_none());
    }

    #[test]
    fn test_dispatch_update_and_delete() {
        let sel = DocumentBuilder::new().string("k", "v").build();
        let upd = DocumentBuilder::new().int32("n", 2).build();
        let frame = PayloadBuilder::update("a.b", 0, &sel, &upd).frame(11, 0);
        let decoded = dispatch(&frame).unwrap();
        assert_eq!(
            decoded.message.as_request().unwrap().statement(),
            "a.b.update({k:v},{n:2})"
        );

        let frame = PayloadBuilder::delete("a.b", &sel).frame(12, 0);
        let decoded = dispatch(&frame).unwrap();
        assert_eq!(
            decoded.message.as_request().unwrap().statement(),
            "a.b.remove(<opaque>)"
        );
    }

    #[test]
    fn test_dispatch_propagates_decoder_error() {
        let payload = vec![0, 0, 0, 0, b'a', b'.', b'b'];
        let frame = PayloadBuilder::raw(OpCode::Query, payload).frame(1, 0);
        assert_eq!(
            dispatch(&frame).unwrap_err(),
            DecodeError::UnterminatedCollectionName
        );
    }
}
