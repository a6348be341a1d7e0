//! Slow-query-log output.
//!
//! Each record becomes one self-contained block in the MySQL / Percona slow
//! log layout, so the output can be fed to tools such as `pt-query-digest`:
//!
//! ```text
//! # Time: 150402 17:02:44
//! # User@Host: [] @ 10.0.0.5 []
//! # Thread_id: 0  Schema:   Last_errno: 0  Killed: 0
//! # Query_time: 0.000052  Lock_time: 0.000000  Rows_sent: 0  Rows_examined: 0  Rows_affected: 0  Rows_read: 0
//! # Bytes_sent: 90
//! SET timestamp=1427994164;
//! test.sample.find({a:test});
//! ```
//!
//! User, schema and row counts are not observable on the wire and are
//! always empty or zero.

use std::fmt;
use std::io::{self, Write};
use std::net::IpAddr;

use chrono::DateTime;

/// What a record reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Request answered by a reply
    Completed,
    /// Request evicted without a reply, after waiting `age_us`
    TimedOut { request_id: i32, age_us: i64 },
    /// Reply with no known request
    Orphaned { response_to: i32 },
}

/// One slow-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowLogRecord {
    /// Capture time the record refers to, in microseconds
    pub timestamp_us: i64,
    pub host: Option<IpAddr>,
    /// Measured latency; 0 unless a reply was matched
    pub query_time_us: i64,
    /// Size of the reply frame; 0 when there was none
    pub bytes_sent: usize,
    /// Rendered statement without the trailing `;` (unused for orphans)
    pub statement: String,
    pub outcome: Outcome,
}

impl SlowLogRecord {
    pub fn completed(
        timestamp_us: i64,
        host: Option<IpAddr>,
        query_time_us: i64,
        bytes_sent: usize,
        statement: String,
    ) -> Self {
        Self {
            timestamp_us,
            host,
            query_time_us,
            bytes_sent,
            statement,
            outcome: Outcome::Completed,
        }
    }

    pub fn timed_out(
        request_id: i32,
        timestamp_us: i64,
        host: Option<IpAddr>,
        age_us: i64,
        statement: String,
    ) -> Self {
        Self {
            timestamp_us,
            host,
            query_time_us: 0,
            bytes_sent: 0,
            statement,
            outcome: Outcome::TimedOut { request_id, age_us },
        }
    }

    pub fn orphaned(
        response_to: i32,
        timestamp_us: i64,
        host: Option<IpAddr>,
        bytes_sent: usize,
    ) -> Self {
        Self {
            timestamp_us,
            host,
            query_time_us: 0,
            bytes_sent,
            statement: String::new(),
            outcome: Outcome::Orphaned { response_to },
        }
    }
}

impl fmt::Display for SlowLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.timestamp_us.div_euclid(1_000_000);
        match DateTime::from_timestamp(seconds, 0) {
            Some(time) => writeln!(f, "# Time: {}", time.format("%y%m%d %H:%M:%S"))?,
            None => writeln!(f, "# Time: 700101 00:00:00")?,
        }

        match self.host {
            Some(ip) => writeln!(f, "# User@Host: [] @ {ip} []")?,
            None => writeln!(f, "# User@Host: [] @  []")?,
        }
        writeln!(f, "# Thread_id: 0  Schema:   Last_errno: 0  Killed: 0")?;

        writeln!(
            f,
            "# Query_time: {}  Lock_time: 0.000000  Rows_sent: 0  Rows_examined: 0  Rows_affected: 0  Rows_read: 0",
            Seconds(self.query_time_us)
        )?;
        if let Outcome::TimedOut { request_id, age_us } = self.outcome {
            writeln!(f, "# Timed_out: request_id={request_id} age={}", Seconds(age_us))?;
        }
        writeln!(f, "# Bytes_sent: {}", self.bytes_sent)?;
        writeln!(f, "SET timestamp={seconds};")?;

        match self.outcome {
            Outcome::Orphaned { response_to } => writeln!(
                f,
                "# administrator command: OrphanedReply responseTo={response_to};"
            ),
            Outcome::Completed | Outcome::TimedOut { .. } => writeln!(f, "{};", self.statement),
        }
    }
}

/// Microseconds as `S.ffffff`, clamped at zero.
struct Seconds(i64);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let us = self.0.max(0);
        write!(f, "{}.{:06}", us / 1_000_000, us % 1_000_000)
    }
}

/// Render a record as one text block.
pub fn format_record(record: &SlowLogRecord) -> String {
    record.to_string()
}

/// Writes records to an output sink, one `write_all` per block.
pub struct SlowLogWriter<W: Write> {
    out: W,
}

impl<W: Write> SlowLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_record(&mut self, record: &SlowLogRecord) -> io::Result<()> {
        let block = format_record(record);
        self.out.write_all(block.as_bytes())?;
        self.out.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    // 2015-04-02T17:02:44Z
    const T0: i64 = 1_427_994_164_000_000;

    #[test]
    fn test_completed_block() {
        let record = SlowLogRecord::completed(
            T0,
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))),
            52,
            90,
            "test.sample.find({a:test})".to_string(),
        );
        let expected = "\
# Time: 150402 17:02:44
# User@Host: [] @ 10.0.0.5 []
# Thread_id: 0  Schema:   Last_errno: 0  Killed: 0
# Query_time: 0.000052  Lock_time: 0.000000  Rows_sent: 0  Rows_examined: 0  Rows_affected: 0  Rows_read: 0
# Bytes_sent: 90
SET timestamp=1427994164;
test.sample.find({a:test});
";
        assert_eq!(format_record(&record), expected);
    }

    #[test]
    fn test_empty_filter_statement_line() {
        let record = SlowLogRecord::completed(T0, None, 0, 0, "test.cmd.find()".to_string());
        let text = format_record(&record);
        assert!(text.ends_with("\ntest.cmd.find();\n"));
        assert!(text.contains("# User@Host: [] @  []\n"));
    }

    #[test]
    fn test_timed_out_block() {
        let record =
            SlowLogRecord::timed_out(42, T0, None, 61_500_000, "a.b.remove(<opaque>)".to_string());
        let text = format_record(&record);
        // The pending age is not a latency
        assert!(text.contains("# Query_time: 0.000000  Lock_time"));
        assert!(text.contains(
            "Rows_read: 0\n# Timed_out: request_id=42 age=61.500000\n# Bytes_sent: 0\n"
        ));
        assert!(text.ends_with("a.b.remove(<opaque>);\n"));
    }

    #[test]
    fn test_orphaned_block() {
        let record = SlowLogRecord::orphaned(189, T0, None, 36);
        let text = format_record(&record);
        assert!(text.contains("# Bytes_sent: 36\n"));
        assert!(text.ends_with(
            "SET timestamp=1427994164;\n# administrator command: OrphanedReply responseTo=189;\n"
        ));
    }

    #[test]
    fn test_writer_appends_whole_blocks() {
        let mut writer = SlowLogWriter::new(Vec::new());
        let record = SlowLogRecord::completed(T0, None, 1, 0, "x.y.find()".to_string());
        writer.write_record(&record).unwrap();
        writer.write_record(&record).unwrap();

        let out = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(out, format_record(&record).repeat(2));
    }
}
