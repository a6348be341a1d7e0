//! Fuzz target for BSON document decoding.
//!
//! Deep nesting must end in an error rather than stack exhaustion.

#![no_main]

use libfuzzer_sys::fuzz_target;
use mongotap_core::bson::{read_document, render_fields};

fuzz_target!(|data: &[u8]| {
    if let Ok((doc, consumed)) = read_document(data) {
        assert!(consumed <= data.len());
        let _ = render_fields(&doc);
    }
});
