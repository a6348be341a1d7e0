//! Fuzz target for capture file parsing.
//!
//! Tests handling of malformed PCAP/PCAPNG files including:
//! - Magic byte detection
//! - Packet record headers (caplen, origlen, timestamps)
//! - Interface description blocks with unknown link types
//! - Link-layer and IP/TCP headers inside packet data

#![no_main]

use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use mongotap_core::capture::{CaptureReader, PcapFormat, PcapFrameSource};
use mongotap_core::FrameSource;

fuzz_target!(|data: &[u8]| {
    let Ok(format) = PcapFormat::detect(data) else {
        return;
    };
    let Ok(reader) = CaptureReader::with_format(Cursor::new(data), format) else {
        return;
    };
    let mut source = PcapFrameSource::new(reader, 27017);
    // Read all frames - should never panic
    while let Ok(Some(_frame)) = source.next_frame() {}
});
