//! # mongotap-core
//!
//! Passive reconstruction of MongoDB statements from captured wire traffic.
//!
//! Frames carrying the legacy MongoDB wire protocol are decoded, their BSON
//! documents rendered back into shell-like statements, requests matched to
//! replies by id, and each operation written out as a MySQL / Percona style
//! slow-log block so that existing slow-log tooling can digest it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::atomic::AtomicBool;
//!
//! use mongotap_core::prelude::*;
//!
//! let source = PcapFrameSource::open("capture.pcap", DEFAULT_PORT).unwrap();
//! let mut sniffer = Sniffer::new(SnifferConfig::default(), std::io::stdout());
//! let stats = sniffer.run(source, &AtomicBool::new(false)).unwrap();
//! eprintln!("{} records", stats.records);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                          mongotap-core                              |
//! +---------------------------------------------------------------------+
//! |  capture/    - PCAP/PCAPNG replay, compression, TCP slicing         |
//! |  source      - FrameSource trait, WireFrame                         |
//! |  wire/       - Message header, opcode decoders, dispatch            |
//! |  bson/       - Document decoding and statement rendering            |
//! |  correlate   - Pending request table, retention sweep               |
//! |  slowlog     - Slow-log record formatting and output                |
//! |  sniffer     - Single-writer pipeline tying it all together         |
//! |  error       - Error types                                          |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Crate Features
//!
//! - `default` - Zstd decompression enabled (gzip is always available)
//! - `compress-zstd` - Zstd decompression support

pub mod bson;
pub mod capture;
pub mod config;
pub mod correlate;
mod cursor;
pub mod error;
pub mod prelude;
pub mod sniffer;
pub mod slowlog;
pub mod source;
pub mod test_utils;
pub mod wire;

pub use capture::PcapFrameSource;
pub use config::{SnifferConfig, Verbosity, DEFAULT_PORT};
pub use error::{CaptureError, DecodeError, Error, Result};
pub use sniffer::{DiagnosticKind, Sniffer, SnifferStats};
pub use source::{FrameSource, VecFrameSource, WireFrame};
