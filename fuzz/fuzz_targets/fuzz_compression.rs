//! Fuzz target for compression detection and decompression.
//!
//! Tests format confusion and decompression bombs for supported formats:
//! - Gzip (0x1f, 0x8b)
//! - Zstd (0x28, 0xb5, 0x2f, 0xfd)

#![no_main]

use std::io::{Cursor, Read};

use libfuzzer_sys::fuzz_target;
use mongotap_core::capture::{Compression, DecompressReader};

/// Maximum bytes to read during decompression to prevent bombs.
const MAX_DECOMPRESS_SIZE: usize = 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let compression = Compression::detect(data);

    if let Ok(reader) = DecompressReader::new(Cursor::new(data), compression) {
        let mut buf = Vec::new();
        let _ = reader.take(MAX_DECOMPRESS_SIZE as u64).read_to_end(&mut buf);
    }
});
