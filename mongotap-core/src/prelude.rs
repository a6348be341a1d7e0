//! Convenient re-exports for common usage.
//!
//! ```rust,no_run
//! use mongotap_core::prelude::*;
//!
//! let sniffer = Sniffer::new(SnifferConfig::default(), Vec::new());
//! ```

// Pipeline
pub use crate::config::{SnifferConfig, Verbosity, DEFAULT_PORT};
pub use crate::sniffer::{DiagnosticKind, Sniffer, SnifferStats};

// Sources
pub use crate::capture::PcapFrameSource;
pub use crate::source::{FrameSource, VecFrameSource, WireFrame};

// Decoding
pub use crate::bson::{Document, Value};
pub use crate::wire::{dispatch, Message, OpCode, RequestOp};

// Output
pub use crate::slowlog::{Outcome, SlowLogRecord, SlowLogWriter};

// Error types
pub use crate::error::{Error, Result};
