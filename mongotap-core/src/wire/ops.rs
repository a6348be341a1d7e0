//! Per-opcode payload decoders.
//!
//! Each decoder receives the bytes following the 16-byte header. Layouts
//! (legacy wire protocol):
//!
//! ```text
//! OP_QUERY        flags:i32  ns:cstring  skip:i32  return:i32  query:doc  [selector:doc]
//! OP_INSERT       flags:i32  ns:cstring  doc*
//! OP_UPDATE       ZERO:i32   ns:cstring  flags:i32  selector:doc  update:doc
//! OP_DELETE       ZERO:i32   ns:cstring  flags:i32  selector:doc
//! OP_GET_MORE     ZERO:i32   ns:cstring  return:i32  cursorID:i64
//! OP_KILL_CURSORS ZERO:i32   count:i32   cursorID:i64*
//! OP_REPLY        flags:i32  cursorID:i64  startingFrom:i32  returned:i32  doc*
//! ```

use std::fmt;

use crate::bson::{read_document, Document, Fields};
use crate::cursor::PayloadCursor;
use crate::error::DecodeError;

/// A request-class operation that can be rendered as a statement.
///
/// The `Display` output is the shell-like statement text, without the
/// trailing `;`.
pub trait RequestOp: fmt::Display {
    /// Full collection name (`db.collection`).
    fn collection(&self) -> &str;

    fn statement(&self) -> String {
        self.to_string()
    }
}

/// Update flag bits.
pub mod update_flags {
    pub const UPSERT: i32 = 1 << 0;
    pub const MULTI: i32 = 1 << 1;
}

/// Suffix identifying command namespaces.
const COMMAND_COLLECTION: &str = "$cmd";

/// Placeholder for operations logged without rendering their arguments.
const OPAQUE: &str = "<opaque>";

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOp {
    pub flags: i32,
    pub collection: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub field_selector: Option<Document>,
}

impl QueryOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        let flags = cursor.read_i32("query flags")?;
        let collection = read_collection(&mut cursor)?;
        let number_to_skip = cursor.read_i32("numberToSkip")?;
        let number_to_return = cursor.read_i32("numberToReturn")?;
        let query = next_document(&mut cursor)?;
        let field_selector = if cursor.is_empty() {
            None
        } else {
            Some(next_document(&mut cursor)?)
        };

        Ok(QueryOp {
            flags,
            collection,
            number_to_skip,
            number_to_return,
            query,
            field_selector,
        })
    }

    pub fn is_command(&self) -> bool {
        self.collection
            .rsplit('.')
            .next()
            .map_or(false, |name| name == COMMAND_COLLECTION)
    }
}

impl RequestOp for QueryOp {
    fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_command() && !self.query.is_empty() {
            return write!(f, "db.runCommand({{{}}})", Fields(&self.query));
        }

        write!(f, "{}.find(", self.collection)?;
        match self.field_selector.as_ref().filter(|s| !s.is_empty()) {
            // An empty filter renders bare, without cursor modifiers.
            None if self.query.is_empty() => return f.write_str(")"),
            None => write!(f, "{{{}}})", Fields(&self.query))?,
            Some(sel) => write!(f, "{{{}}},{{{}}})", Fields(&self.query), Fields(sel))?,
        }

        if !self.is_command() {
            if self.number_to_skip != 0 {
                write!(f, ".skip({})", self.number_to_skip)?;
            }
            if self.number_to_return != 0 {
                write!(f, ".limit({})", self.number_to_return)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertOp {
    pub flags: i32,
    pub collection: String,
    pub documents: Vec<Document>,
}

impl InsertOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        let flags = cursor.read_i32("insert flags")?;
        let collection = read_collection(&mut cursor)?;
        let mut documents = Vec::new();
        while !cursor.is_empty() {
            documents.push(next_document(&mut cursor)?);
        }

        Ok(InsertOp {
            flags,
            collection,
            documents,
        })
    }
}

impl RequestOp for InsertOp {
    fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for InsertOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.documents.as_slice() {
            [] => write!(f, "{}.insert()", self.collection),
            [doc] => write!(f, "{}.insert({{{}}})", self.collection, Fields(doc)),
            docs => {
                write!(f, "{}.insert([", self.collection)?;
                for (i, doc) in docs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{{{}}}", Fields(doc))?;
                }
                f.write_str("])")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub collection: String,
    pub flags: i32,
    pub selector: Document,
    pub update: Document,
}

impl UpdateOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        cursor.skip(4, "update ZERO")?;
        let collection = read_collection(&mut cursor)?;
        let flags = cursor.read_i32("update flags")?;
        let selector = next_document(&mut cursor)?;
        let update = next_document(&mut cursor)?;

        Ok(UpdateOp {
            collection,
            flags,
            selector,
            update,
        })
    }

    pub fn is_upsert(&self) -> bool {
        self.flags & update_flags::UPSERT != 0
    }

    pub fn is_multi(&self) -> bool {
        self.flags & update_flags::MULTI != 0
    }
}

impl RequestOp for UpdateOp {
    fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.update({{{}}},{{{}}}",
            self.collection,
            Fields(&self.selector),
            Fields(&self.update)
        )?;
        match (self.is_upsert(), self.is_multi()) {
            (true, true) => f.write_str(",{upsert:true,multi:true})"),
            (true, false) => f.write_str(",{upsert:true})"),
            (false, true) => f.write_str(",{multi:true})"),
            (false, false) => f.write_str(")"),
        }
    }
}

/// Delete request. The selector is not rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOp {
    pub collection: String,
    pub flags: i32,
}

impl DeleteOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        cursor.skip(4, "delete ZERO")?;
        let collection = read_collection(&mut cursor)?;
        let flags = cursor.read_i32("delete flags")?;
        Ok(DeleteOp { collection, flags })
    }
}

impl RequestOp for DeleteOp {
    fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for DeleteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.remove({OPAQUE})", self.collection)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetMoreOp {
    pub collection: String,
    pub number_to_return: i32,
    pub cursor_id: i64,
}

impl GetMoreOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        cursor.skip(4, "getMore ZERO")?;
        let collection = read_collection(&mut cursor)?;
        let number_to_return = cursor.read_i32("numberToReturn")?;
        let cursor_id = cursor.read_i64("cursorID")?;
        Ok(GetMoreOp {
            collection,
            number_to_return,
            cursor_id,
        })
    }
}

impl RequestOp for GetMoreOp {
    fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for GetMoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.getMore({OPAQUE})", self.collection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillCursorsOp {
    pub cursor_count: i32,
}

impl KillCursorsOp {
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut cursor = PayloadCursor::new(payload);
        cursor.skip(4, "killCursors ZERO")?;
        let cursor_count = cursor.read_i32("numberOfCursorIDs")?;
        Ok(KillCursorsOp { cursor_count })
    }
}

/// Fixed part of an OP_REPLY body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySummary {
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
}

impl ReplySummary {
    /// Bytes occupied by the fixed fields.
    pub const LEN: usize = 20;

    /// Decode the fixed fields; `None` when the payload is too short to hold them.
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let mut cursor = PayloadCursor::new(payload);
        Some(ReplySummary {
            response_flags: cursor.read_i32("responseFlags").ok()?,
            cursor_id: cursor.read_i64("cursorID").ok()?,
            starting_from: cursor.read_i32("startingFrom").ok()?,
            number_returned: cursor.read_i32("numberReturned").ok()?,
        })
    }
}

/// Read the NUL-terminated `db.collection` name.
fn read_collection(cursor: &mut PayloadCursor<'_>) -> Result<String, DecodeError> {
    cursor
        .read_cstring()
        .map(|name| String::from_utf8_lossy(name).into_owned())
        .ok_or(DecodeError::UnterminatedCollectionName)
}

/// Read the next length-prefixed document and advance past it.
fn next_document(cursor: &mut PayloadCursor<'_>) -> Result<Document, DecodeError> {
    let (doc, used) = read_document(cursor.rest())?;
    cursor.skip(used, "document")?;
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson::Value;
    use crate::test_utils::{encode_document, DocumentBuilder, PayloadBuilder};

    #[test]
    fn test_query_empty_filter_renders_bare_find() {
        let payload = PayloadBuilder::query("test.cmd", &Document::new()).build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.collection, "test.cmd");
        assert_eq!(op.statement(), "test.cmd.find()");
    }

    #[test]
    fn test_query_empty_filter_drops_cursor_modifiers() {
        // findOne() from the shell: empty filter, numberToReturn -1
        let payload = PayloadBuilder::query_with("app.items", 20, -1, &Document::new(), None)
            .build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.number_to_skip, 20);
        assert_eq!(op.number_to_return, -1);
        assert_eq!(op.statement(), "app.items.find()");
        assert_eq!(op.to_string(), op.statement());
    }

    #[test]
    fn test_query_with_filter() {
        let filter = DocumentBuilder::new()
            .string("a", "test")
            .string("b", "another test")
            .build();
        let payload = PayloadBuilder::query("db.sample", &filter).build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "db.sample.find({a:test,b:another test})");
    }

    #[test]
    fn test_query_skip_limit_and_selector() {
        let filter = DocumentBuilder::new().int32("age", 30).build();
        let selector = DocumentBuilder::new().int32("name", 1).build();
        let payload = PayloadBuilder::query_with("shop.users", 10, 5, &filter, Some(&selector))
            .build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.number_to_skip, 10);
        assert_eq!(op.number_to_return, 5);
        assert_eq!(
            op.statement(),
            "shop.users.find({age:30},{name:1}).skip(10).limit(5)"
        );
    }

    #[test]
    fn test_query_selector_with_empty_filter() {
        let selector = DocumentBuilder::new().int32("name", 1).build();
        let payload =
            PayloadBuilder::query_with("shop.users", 0, 0, &Document::new(), Some(&selector))
                .build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "shop.users.find({},{name:1})");

        let payload =
            PayloadBuilder::query_with("shop.users", 0, 3, &Document::new(), Some(&selector))
                .build();
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "shop.users.find({},{name:1}).limit(3)");
    }

    #[test]
    fn test_command_query() {
        // Captured shell handshake: test.$cmd {isMaster: 1.0, forShell: 1.0}, numberToReturn -1
        let payload = [
            0, 0, 0, 0, 116, 101, 115, 116, 46, 36, 99, 109, 100, 0, 0, 0, 0, 0, 255, 255, 255,
            255, 41, 0, 0, 0, 1, 105, 115, 77, 97, 115, 116, 101, 114, 0, 0, 0, 0, 0, 0, 0, 240,
            63, 1, 102, 111, 114, 83, 104, 101, 108, 108, 0, 0, 0, 0, 0, 0, 0, 240, 63, 0,
        ];
        let op = QueryOp::decode(&payload).unwrap();
        assert_eq!(op.collection, "test.$cmd");
        assert!(op.is_command());
        assert_eq!(op.number_to_return, -1);
        assert_eq!(op.statement(), "db.runCommand({isMaster:1,forShell:1})");
    }

    #[test]
    fn test_unterminated_collection_name() {
        let mut payload = 0i32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"test.coll");
        assert_eq!(
            QueryOp::decode(&payload).unwrap_err(),
            DecodeError::UnterminatedCollectionName
        );
    }

    #[test]
    fn test_query_document_overrun() {
        let mut payload = PayloadBuilder::query("test.c", &Document::new()).build();
        let doc_start = payload.len() - 5;
        payload[doc_start..doc_start + 4].copy_from_slice(&500i32.to_le_bytes());
        assert_eq!(
            QueryOp::decode(&payload).unwrap_err(),
            DecodeError::DocumentLengthOverrun {
                declared: 500,
                available: 5
            }
        );
    }

    #[test]
    fn test_insert_single_and_many() {
        let doc = DocumentBuilder::new().string("name", "x").build();
        let payload = PayloadBuilder::insert("app.items", &[doc.clone()]).build();
        let op = InsertOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "app.items.insert({name:x})");

        let other = DocumentBuilder::new().string("name", "y").build();
        let payload = PayloadBuilder::insert("app.items", &[doc, other]).build();
        let op = InsertOp::decode(&payload).unwrap();
        assert_eq!(op.documents.len(), 2);
        assert_eq!(op.statement(), "app.items.insert([{name:x},{name:y}])");
    }

    #[test]
    fn test_update_uses_own_layout() {
        let selector = DocumentBuilder::new().string("name", "alice").build();
        let set = DocumentBuilder::new().int32("age", 31).build();
        let update = DocumentBuilder::new().document("$set", set).build();
        let payload = PayloadBuilder::update("app.users", 0, &selector, &update).build();

        let op = UpdateOp::decode(&payload).unwrap();
        assert_eq!(op.collection, "app.users");
        assert_eq!(op.selector, selector);
        assert_eq!(op.update, update);
        assert_eq!(
            op.statement(),
            "app.users.update({name:alice},{$set:{age:31}})"
        );
    }

    #[test]
    fn test_update_with_large_selector() {
        // Boundary between the two documents must come from the 4-byte prefix.
        let selector = DocumentBuilder::new().string("blob", &"s".repeat(300)).build();
        let update = DocumentBuilder::new().int32("n", 1).build();
        let payload = PayloadBuilder::update("app.big", 0, &selector, &update).build();
        let op = UpdateOp::decode(&payload).unwrap();
        assert_eq!(op.update.get("n"), Some(&Value::Integer(1)));
    }

    #[test]
    fn test_update_flags() {
        let empty = Document::new();
        let payload = PayloadBuilder::update(
            "a.b",
            update_flags::UPSERT | update_flags::MULTI,
            &empty,
            &empty,
        )
        .build();
        let op = UpdateOp::decode(&payload).unwrap();
        assert!(op.is_upsert());
        assert!(op.is_multi());
        assert_eq!(op.statement(), "a.b.update({},{},{upsert:true,multi:true})");

        let payload = PayloadBuilder::update("a.b", update_flags::MULTI, &empty, &empty).build();
        let op = UpdateOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "a.b.update({},{},{multi:true})");
    }

    #[test]
    fn test_update_missing_second_document() {
        let mut payload = 0i32.to_le_bytes().to_vec();
        payload.extend_from_slice(b"a.b\0");
        payload.extend_from_slice(&0i32.to_le_bytes());
        payload.extend_from_slice(&encode_document(&Document::new()));
        assert!(matches!(
            UpdateOp::decode(&payload).unwrap_err(),
            DecodeError::Truncated { .. }
        ));
    }

    #[test]
    fn test_opaque_operations() {
        let payload = PayloadBuilder::delete("app.logs", &Document::new()).build();
        let op = DeleteOp::decode(&payload).unwrap();
        assert_eq!(op.statement(), "app.logs.remove(<opaque>)");

        let payload = PayloadBuilder::get_more("app.logs", 100, 0x1234_5678_9abc).build();
        let op = GetMoreOp::decode(&payload).unwrap();
        assert_eq!(op.number_to_return, 100);
        assert_eq!(op.cursor_id, 0x1234_5678_9abc);
        assert_eq!(op.statement(), "app.logs.getMore(<opaque>)");

        let payload = PayloadBuilder::kill_cursors(&[1, 2, 3]).build();
        assert_eq!(KillCursorsOp::decode(&payload).unwrap().cursor_count, 3);
    }

    #[test]
    fn test_reply_summary() {
        let payload = PayloadBuilder::reply(&[Document::new()]).build();
        let summary = ReplySummary::decode(&payload).unwrap();
        assert_eq!(summary.number_returned, 1);
        assert_eq!(summary.cursor_id, 0);
        assert!(ReplySummary::decode(&payload[..ReplySummary::LEN - 1]).is_none());
    }
}
