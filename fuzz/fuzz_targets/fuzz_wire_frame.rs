//! Fuzz target for wire frame dispatch and statement rendering.
//!
//! Tests handling of:
//! - Truncated or lying message headers
//! - Unterminated collection names
//! - Document length prefixes that overrun the frame
//! - Correlation of arbitrary request/response ids

#![no_main]

use libfuzzer_sys::fuzz_target;
use mongotap_core::wire::dispatch;
use mongotap_core::{Sniffer, SnifferConfig, Verbosity, WireFrame};

fuzz_target!(|data: &[u8]| {
    // Decoding and rendering should never panic
    if let Ok(decoded) = dispatch(data) {
        if let Some(request) = decoded.message.as_request() {
            let _ = request.collection();
            let _ = request.statement();
        }
    }

    // Feed the same bytes through the pipeline twice so replies can match
    let config = SnifferConfig::default().with_verbosity(Verbosity::Quiet);
    let mut sniffer = Sniffer::new(config, Vec::new());
    let _ = sniffer.process_frame(&WireFrame::new(1, 0, data.to_vec()));
    let _ = sniffer.process_frame(&WireFrame::new(2, 1, data.to_vec()));
    let _ = sniffer.finish();
});
