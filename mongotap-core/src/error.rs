//! Error types for mongotap-core.
//!
//! - [`enum@Error`] - Main error enum that wraps all error types
//! - [`CaptureError`] - The capture source could not be opened or failed mid-read
//! - [`DecodeError`] - A single frame could not be decoded
//!
//! Decode errors are local to one frame: the pipeline records a diagnostic
//! and moves on. Capture errors end the pipeline.

use thiserror::Error;

/// Main error type for mongotap-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The capture source failed
    #[error("capture source failure: {0}")]
    Capture(#[from] CaptureError),

    /// A frame could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error (output sink)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a capture source.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found or not readable
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Not a PCAP/PCAPNG container, or the container is corrupt
    #[error("invalid capture format: {reason}")]
    InvalidFormat { reason: String },

    /// Link type we cannot slice down to TCP
    #[error("unsupported link type: {link_type}")]
    UnsupportedLinkType { link_type: u16 },
}

/// Errors raised while decoding one wire frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Frame shorter than the 16-byte message header
    #[error("frame too short: {len} bytes, header needs 16")]
    FrameTooShort { len: usize },

    /// No NUL byte terminates the collection name
    #[error("collection name is not NUL-terminated")]
    UnterminatedCollectionName,

    /// A document declares more bytes than the payload holds
    #[error("document declares {declared} bytes but only {available} remain")]
    DocumentLengthOverrun { declared: i64, available: usize },

    /// A fixed-width field runs past the end of the payload
    #[error("{field}: need {needed} bytes, have {have}")]
    Truncated {
        field: &'static str,
        needed: usize,
        have: usize,
    },

    /// Nesting exceeds the decoder depth limit
    #[error("document nesting exceeds {limit} levels")]
    TooDeeplyNested { limit: usize },

    /// Structurally invalid document contents
    #[error("malformed document: {reason}")]
    MalformedDocument { reason: String },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::MalformedDocument {
            reason: reason.into(),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
