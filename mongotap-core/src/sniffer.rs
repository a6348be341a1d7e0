//! The decode → correlate → format pipeline.
//!
//! [`Sniffer`] owns the correlation table and the output writer and is the
//! only thing that mutates them. Frames are processed strictly in the
//! order the source yields them.

use std::io::Write;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::config::{SnifferConfig, Verbosity};
use crate::correlate::{CorrelationTable, Displaced, PendingRequest};
use crate::error::{DecodeError, Result};
use crate::slowlog::{SlowLogRecord, SlowLogWriter};
use crate::source::{FrameSource, WireFrame};
use crate::wire::{dispatch, DecodedFrame, Message};

/// Non-fatal conditions observed while processing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    FrameTooShort,
    UnterminatedCollectionName,
    DocumentLengthOverrun,
    Truncated,
    TooDeeplyNested,
    MalformedDocument,
    UnknownOpcode,
    OrphanedReply,
    TimedOutRequest,
}

impl From<&DecodeError> for DiagnosticKind {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::FrameTooShort { .. } => DiagnosticKind::FrameTooShort,
            DecodeError::UnterminatedCollectionName => DiagnosticKind::UnterminatedCollectionName,
            DecodeError::DocumentLengthOverrun { .. } => DiagnosticKind::DocumentLengthOverrun,
            DecodeError::Truncated { .. } => DiagnosticKind::Truncated,
            DecodeError::TooDeeplyNested { .. } => DiagnosticKind::TooDeeplyNested,
            DecodeError::MalformedDocument { .. } => DiagnosticKind::MalformedDocument,
        }
    }
}

/// Counters kept by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnifferStats {
    pub frames: u64,
    pub requests: u64,
    pub replies: u64,
    pub completed: u64,
    pub kill_cursors: u64,
    pub records: u64,
    pub frame_too_short: u64,
    pub unterminated_collection_name: u64,
    pub document_length_overrun: u64,
    pub truncated: u64,
    pub too_deeply_nested: u64,
    pub malformed_document: u64,
    pub unknown_opcode: u64,
    pub orphaned_replies: u64,
    pub timed_out: u64,
}

impl SnifferStats {
    fn record(&mut self, kind: DiagnosticKind) {
        *self.counter(kind) += 1;
    }

    /// Count for one diagnostic kind.
    pub fn diagnostics(&self, kind: DiagnosticKind) -> u64 {
        match kind {
            DiagnosticKind::FrameTooShort => self.frame_too_short,
            DiagnosticKind::UnterminatedCollectionName => self.unterminated_collection_name,
            DiagnosticKind::DocumentLengthOverrun => self.document_length_overrun,
            DiagnosticKind::Truncated => self.truncated,
            DiagnosticKind::TooDeeplyNested => self.too_deeply_nested,
            DiagnosticKind::MalformedDocument => self.malformed_document,
            DiagnosticKind::UnknownOpcode => self.unknown_opcode,
            DiagnosticKind::OrphanedReply => self.orphaned_replies,
            DiagnosticKind::TimedOutRequest => self.timed_out,
        }
    }

    /// Frames that failed to decode.
    pub fn decode_errors(&self) -> u64 {
        self.frame_too_short
            + self.unterminated_collection_name
            + self.document_length_overrun
            + self.truncated
            + self.too_deeply_nested
            + self.malformed_document
    }

    fn counter(&mut self, kind: DiagnosticKind) -> &mut u64 {
        match kind {
            DiagnosticKind::FrameTooShort => &mut self.frame_too_short,
            DiagnosticKind::UnterminatedCollectionName => &mut self.unterminated_collection_name,
            DiagnosticKind::DocumentLengthOverrun => &mut self.document_length_overrun,
            DiagnosticKind::Truncated => &mut self.truncated,
            DiagnosticKind::TooDeeplyNested => &mut self.too_deeply_nested,
            DiagnosticKind::MalformedDocument => &mut self.malformed_document,
            DiagnosticKind::UnknownOpcode => &mut self.unknown_opcode,
            DiagnosticKind::OrphanedReply => &mut self.orphaned_replies,
            DiagnosticKind::TimedOutRequest => &mut self.timed_out,
        }
    }
}

/// Single-writer pipeline from frames to slow-log records.
pub struct Sniffer<W: Write> {
    config: SnifferConfig,
    table: CorrelationTable,
    writer: SlowLogWriter<W>,
    stats: SnifferStats,
    /// Latest capture timestamp seen
    clock_us: Option<i64>,
}

impl<W: Write> Sniffer<W> {
    pub fn new(config: SnifferConfig, sink: W) -> Self {
        let table =
            CorrelationTable::new(config.retention, config.sweep_interval, config.max_pending);
        Self {
            config,
            table,
            writer: SlowLogWriter::new(sink),
            stats: SnifferStats::default(),
            clock_us: None,
        }
    }

    pub fn config(&self) -> &SnifferConfig {
        &self.config
    }

    pub fn stats(&self) -> &SnifferStats {
        &self.stats
    }

    pub fn table(&self) -> &CorrelationTable {
        &self.table
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    /// Consume `source` until it ends or `stop` is set, then flush pending requests.
    ///
    /// The stop flag is checked between frames, so the current frame always
    /// finishes processing.
    pub fn run<S: FrameSource>(
        &mut self,
        mut source: S,
        stop: &AtomicBool,
    ) -> Result<SnifferStats> {
        let outcome = self.consume(&mut source, stop);
        // Pending entries are reported even when the source failed.
        let flushed = self.finish();
        outcome?;
        flushed?;

        info!(
            frames = self.stats.frames,
            records = self.stats.records,
            completed = self.stats.completed,
            orphaned = self.stats.orphaned_replies,
            timed_out = self.stats.timed_out,
            decode_errors = self.stats.decode_errors(),
            "Capture finished"
        );
        Ok(self.stats.clone())
    }

    fn consume<S: FrameSource>(&mut self, source: &mut S, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            match source.next_frame()? {
                Some(frame) => self.process_frame(&frame)?,
                None => break,
            }
        }
        if stop.load(Ordering::Relaxed) {
            info!("Stop requested, flushing pending requests");
        }
        Ok(())
    }

    /// Process one frame.
    ///
    /// Decode problems are counted and logged; only output I/O errors are returned.
    pub fn process_frame(&mut self, frame: &WireFrame) -> Result<()> {
        self.stats.frames += 1;
        let now = frame.timestamp_us;
        self.clock_us = Some(self.clock_us.map_or(now, |c| c.max(now)));

        for expired in self.table.sweep(now) {
            self.emit_timed_out(expired, now)?;
        }

        let decoded = match dispatch(&frame.payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.stats.record(DiagnosticKind::from(&err));
                if self.config.verbosity >= Verbosity::Normal {
                    warn!(frame = frame.frame_number, error = %err, "Failed to decode frame");
                }
                return Ok(());
            }
        };

        if !decoded.header.length_matches(frame.payload.len()) {
            debug!(
                frame = frame.frame_number,
                declared = decoded.header.message_length,
                captured = frame.payload.len(),
                "messageLength does not match captured frame size"
            );
        }
        if self.config.verbosity >= Verbosity::Diagnostic {
            debug!(
                frame = frame.frame_number,
                op = %decoded.header.op_code,
                request_id = decoded.header.request_id,
                response_to = decoded.header.response_to,
                "Decoded frame"
            );
        }

        self.handle(frame, decoded)
    }

    fn handle(&mut self, frame: &WireFrame, decoded: DecodedFrame) -> Result<()> {
        let DecodedFrame { header, message } = decoded;

        if let Some(op) = message.as_request() {
            self.stats.requests += 1;
            let pending = PendingRequest {
                request_id: header.request_id,
                collection: op.collection().to_string(),
                statement: op.statement(),
                start_us: frame.timestamp_us,
                client: frame.src,
            };
            match self.table.insert(pending) {
                Some(Displaced::Evicted(evicted)) => {
                    debug!(request_id = evicted.request_id, "Pending table full, evicting oldest");
                    self.emit_timed_out(evicted, frame.timestamp_us)?;
                }
                Some(Displaced::Replaced(_)) | None => {}
            }
            return Ok(());
        }

        match message {
            Message::Reply(summary) => {
                self.stats.replies += 1;
                let bytes_sent = frame.payload.len();
                match self.table.complete(header.response_to) {
                    Some(request) => {
                        let elapsed = request.elapsed_us(frame.timestamp_us);
                        self.stats.completed += 1;
                        let record = SlowLogRecord::completed(
                            request.start_us,
                            client_ip(request.client),
                            elapsed,
                            bytes_sent,
                            request.statement,
                        );
                        self.emit(&record)?;
                    }
                    None => {
                        self.stats.record(DiagnosticKind::OrphanedReply);
                        if self.config.verbosity >= Verbosity::Normal {
                            warn!(
                                frame = frame.frame_number,
                                response_to = header.response_to,
                                returned = summary.map(|s| s.number_returned),
                                "Reply without a pending request"
                            );
                        }
                        let record = SlowLogRecord::orphaned(
                            header.response_to,
                            frame.timestamp_us,
                            client_ip(frame.dst),
                            bytes_sent,
                        );
                        self.emit(&record)?;
                    }
                }
            }
            Message::KillCursors(op) => {
                self.stats.kill_cursors += 1;
                if self.config.verbosity >= Verbosity::Normal {
                    info!(
                        frame = frame.frame_number,
                        request_id = header.request_id,
                        cursors = op.cursor_count,
                        "killCursors"
                    );
                }
            }
            Message::Unhandled { payload_len } => {
                self.stats.record(DiagnosticKind::UnknownOpcode);
                if self.config.verbosity >= Verbosity::Normal {
                    warn!(
                        frame = frame.frame_number,
                        op = %header.op_code,
                        payload_len,
                        "Unhandled opcode"
                    );
                }
            }
            Message::Query(_)
            | Message::Insert(_)
            | Message::Update(_)
            | Message::Delete(_)
            | Message::GetMore(_) => {}
        }
        Ok(())
    }

    /// Flush every pending request as timed out.
    pub fn finish(&mut self) -> Result<()> {
        let now = self.clock_us.unwrap_or(0);
        for request in self.table.drain() {
            self.emit_timed_out(request, now)?;
        }
        Ok(())
    }

    fn emit_timed_out(&mut self, request: PendingRequest, now_us: i64) -> Result<()> {
        self.stats.record(DiagnosticKind::TimedOutRequest);
        let age = request.elapsed_us(now_us);
        if self.config.verbosity >= Verbosity::Normal {
            warn!(
                request_id = request.request_id,
                collection = %request.collection,
                age_us = age,
                "Request timed out without a reply"
            );
        }
        let record = SlowLogRecord::timed_out(
            request.request_id,
            request.start_us,
            client_ip(request.client),
            age,
            request.statement,
        );
        self.emit(&record)
    }

    fn emit(&mut self, record: &SlowLogRecord) -> Result<()> {
        self.writer.write_record(record)?;
        self.stats.records += 1;
        Ok(())
    }
}

fn client_ip(addr: Option<SocketAddr>) -> Option<IpAddr> {
    addr.map(|a| a.ip())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::bson::Document;
    use crate::source::VecFrameSource;
    use crate::test_utils::{DocumentBuilder, PayloadBuilder};
    use crate::wire::OpCode;

    const SEC: i64 = 1_000_000;
    const T0: i64 = 1_427_994_164_000_000;

    fn sniffer() -> Sniffer<Vec<u8>> {
        Sniffer::new(SnifferConfig::default(), Vec::new())
    }

    fn query_frame(n: u64, ts: i64, request_id: i32, ns: &str) -> WireFrame {
        let frame = PayloadBuilder::query(ns, &Document::new()).frame(request_id, 0);
        WireFrame::new(n, ts, frame)
    }

    fn reply_frame(n: u64, ts: i64, response_to: i32) -> WireFrame {
        let frame = PayloadBuilder::reply(&[]).frame(9000 + n as i32, response_to);
        WireFrame::new(n, ts, frame)
    }

    fn output(sniffer: &Sniffer<Vec<u8>>) -> String {
        String::from_utf8(sniffer.get_ref().clone()).unwrap()
    }

    #[test]
    fn test_request_then_reply_emits_one_record() {
        let mut s = sniffer();
        s.process_frame(&query_frame(1, T0, 189, "test.cmd")).unwrap();
        s.process_frame(&reply_frame(2, T0 + 52, 189)).unwrap();

        let out = output(&s);
        assert!(out.contains("# Query_time: 0.000052  Lock_time"));
        assert!(out.contains("# Bytes_sent: 36\n"));
        assert!(out.ends_with("test.cmd.find();\n"));
        assert!(!s.table().contains(189));
        assert_eq!(s.stats().completed, 1);

        // A second reply for the same id is an orphan, not a duplicate record
        s.process_frame(&reply_frame(3, T0 + 60, 189)).unwrap();
        assert_eq!(output(&s).matches("test.cmd.find();").count(), 1);
        assert_eq!(s.stats().orphaned_replies, 1);
    }

    #[test]
    fn test_elapsed_never_negative() {
        let mut s = sniffer();
        s.process_frame(&query_frame(1, T0, 5, "a.b")).unwrap();
        s.process_frame(&reply_frame(2, T0 - 10, 5)).unwrap();
        assert!(output(&s).contains("# Query_time: 0.000000  "));
    }

    #[test]
    fn test_short_frame_does_not_stop_pipeline() {
        let mut s = sniffer();
        s.process_frame(&WireFrame::new(1, T0, vec![1u8, 2, 3])).unwrap();
        s.process_frame(&query_frame(2, T0, 1, "a.b")).unwrap();

        assert_eq!(s.stats().diagnostics(DiagnosticKind::FrameTooShort), 1);
        assert_eq!(s.stats().frames, 2);
        assert!(s.table().contains(1));
    }

    #[test]
    fn test_orphaned_reply_emits_exactly_one_record() {
        let mut s = sniffer();
        s.process_frame(&reply_frame(1, T0, 77)).unwrap();

        let out = output(&s);
        assert_eq!(out.matches("# Time: ").count(), 1);
        assert!(out.contains("# administrator command: OrphanedReply responseTo=77;\n"));
        assert_eq!(s.stats().diagnostics(DiagnosticKind::OrphanedReply), 1);
    }

    #[test]
    fn test_decode_error_keeps_other_pending_requests() {
        let mut s = sniffer();
        s.process_frame(&query_frame(1, T0, 10, "a.b")).unwrap();

        let mut bad = PayloadBuilder::query("a.c", &Document::new()).frame(11, 0);
        let doc_start = bad.len() - 5;
        bad[doc_start..doc_start + 4].copy_from_slice(&500i32.to_le_bytes());
        s.process_frame(&WireFrame::new(2, T0, bad)).unwrap();

        assert_eq!(s.stats().document_length_overrun, 1);
        assert!(s.table().contains(10));
        assert!(!s.table().contains(11));
    }

    #[test]
    fn test_unknown_opcode_counted() {
        let mut s = sniffer();
        let frame = PayloadBuilder::raw(OpCode::Unknown(2013), vec![0; 8]).frame(1, 0);
        s.process_frame(&WireFrame::new(1, T0, frame)).unwrap();
        assert_eq!(s.stats().unknown_opcode, 1);
        assert!(s.table().is_empty());
        assert!(output(&s).is_empty());
    }

    #[test]
    fn test_kill_cursors_is_pass_through() {
        let mut s = sniffer();
        let frame = PayloadBuilder::kill_cursors(&[1]).frame(4, 0);
        s.process_frame(&WireFrame::new(1, T0, frame)).unwrap();
        assert_eq!(s.stats().kill_cursors, 1);
        assert!(s.table().is_empty());
    }

    #[test]
    fn test_sustained_requests_stay_bounded() {
        let config = SnifferConfig::default().with_retention(Duration::from_secs(5));
        let mut s = Sniffer::new(config, Vec::new());

        let n = 2_000;
        for i in 0..n {
            let ts = T0 + i64::from(i) * (SEC / 10);
            s.process_frame(&query_frame(i as u64 + 1, ts, i, "load.test")).unwrap();
            assert!(s.table().len() <= 61, "table grew to {}", s.table().len());
        }

        let timed_out = s.stats().timed_out;
        assert!(timed_out > 0);
        assert_eq!(timed_out as usize + s.table().len(), n as usize);
        assert_eq!(output(&s).matches("# Timed_out: ").count() as u64, timed_out);
    }

    #[test]
    fn test_capacity_cap_evicts_when_clock_stalls() {
        let config = SnifferConfig::default().with_max_pending(3);
        let mut s = Sniffer::new(config, Vec::new());
        for i in 0..10 {
            s.process_frame(&query_frame(1, T0, i, "a.b")).unwrap();
        }
        assert_eq!(s.table().len(), 3);
        assert_eq!(s.stats().timed_out, 7);
    }

    #[test]
    fn test_finish_flushes_pending_as_timed_out() {
        let mut s = sniffer();
        let sel = DocumentBuilder::new().string("name", "x").build();
        let frame = PayloadBuilder::update("app.users", 0, &sel, &sel).frame(3, 0);
        s.process_frame(&WireFrame::new(1, T0, frame)).unwrap();
        s.process_frame(&query_frame(2, T0 + 2 * SEC, 4, "app.users")).unwrap();
        s.finish().unwrap();

        let out = output(&s);
        assert!(s.table().is_empty());
        assert!(out.contains("# Timed_out: request_id=3 age=2.000000\n"));
        assert!(out.contains("app.users.update({name:x},{name:x});\n"));
        assert!(out.contains("# Timed_out: request_id=4 age=0.000000\n"));
        assert!(!out.contains("# Query_time: 2.000000"));
    }

    #[test]
    fn test_unanswered_write_reports_zero_query_time() {
        let mut s = sniffer();
        let doc = DocumentBuilder::new().string("name", "x").build();
        let frame = PayloadBuilder::insert("app.items", &[doc]).frame(1, 0);
        s.process_frame(&WireFrame::new(1, T0, frame)).unwrap();
        // Any later frame past the retention window triggers the sweep
        s.process_frame(&query_frame(2, T0 + 61 * SEC, 2, "app.items")).unwrap();

        let out = output(&s);
        assert_eq!(s.stats().timed_out, 1);
        assert!(out.contains("# Query_time: 0.000000  Lock_time"));
        assert!(out.contains("# Timed_out: request_id=1 age=61.000000\n"));
        assert!(out.ends_with("app.items.insert({name:x});\n"));
        assert!(!out.contains("# Query_time: 61"));
    }

    #[test]
    fn test_run_honours_stop_flag() {
        let mut s = sniffer();
        let stop = AtomicBool::new(true);
        let source = VecFrameSource::new([query_frame(1, T0, 1, "a.b")]);
        let stats = s.run(source, &stop).unwrap();
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_run_drains_source_and_flushes() {
        let mut s = sniffer();
        let stop = AtomicBool::new(false);
        let mut source = VecFrameSource::new([
            query_frame(1, T0, 1, "a.b"),
            reply_frame(2, T0 + 100, 1),
            query_frame(3, T0 + 200, 2, "a.c"),
        ]);
        let stats = s.run(&mut source, &stop).unwrap();

        assert_eq!(source.remaining(), 0);
        assert_eq!(stats.frames, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.records, 2);
    }
}
