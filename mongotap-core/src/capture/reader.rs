//! PCAP / PCAPNG container reader.
//!
//! Wraps the `pcap_parser` streaming readers behind a single
//! [`CaptureReader::next_packet`] call, and [`CaptureReader::open`] adds
//! file handling with compression detection on top.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{LegacyPcapReader, PcapBlockOwned, PcapError, PcapNGReader};

use super::decompress::{Compression, DecompressReader};
use crate::error::{CaptureError, Error, Result};

/// Buffer size for the pcap_parser readers.
const BUFFER_SIZE: usize = 262144;

/// Link type assumed until a header says otherwise (Ethernet).
const DEFAULT_LINK_TYPE: u32 = 1;

/// Container format, from the magic number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PcapFormat {
    /// Classic PCAP, microsecond timestamps (either byte order)
    LegacyMicro,
    /// Classic PCAP, nanosecond timestamps (either byte order)
    LegacyNano,
    PcapNg,
}

impl PcapFormat {
    pub fn detect(magic: &[u8]) -> Result<Self> {
        let bytes: [u8; 4] = magic
            .get(..4)
            .and_then(|m| m.try_into().ok())
            .ok_or_else(|| invalid("data too small for capture magic"))?;

        match u32::from_le_bytes(bytes) {
            0xa1b2c3d4 | 0xd4c3b2a1 => Ok(PcapFormat::LegacyMicro),
            0xa1b23c4d | 0x4d3cb2a1 => Ok(PcapFormat::LegacyNano),
            0x0a0d0d0a => Ok(PcapFormat::PcapNg),
            other => Err(invalid(format!("unknown capture magic: 0x{other:08x}"))),
        }
    }
}

/// One captured link-layer packet.
#[derive(Clone, Debug)]
pub struct RawPacket {
    /// Frame number (1-indexed)
    pub frame_number: u64,
    /// Timestamp in microseconds since the Unix epoch
    pub timestamp_us: i64,
    pub link_type: u32,
    pub data: Bytes,
}

enum ReaderInner<R: Read> {
    Legacy {
        reader: LegacyPcapReader<BufReader<R>>,
        nanos: bool,
        link_type: u32,
    },
    Ng {
        reader: PcapNGReader<BufReader<R>>,
        /// Link type per interface, indexed by interface id
        link_types: Vec<u32>,
    },
}

/// Sequential packet reader over any byte source.
pub struct CaptureReader<R: Read> {
    inner: ReaderInner<R>,
    frame_number: u64,
}

impl CaptureReader<DecompressReader<File>> {
    /// Open a capture file, decompressing it if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut file = File::open(path).map_err(|_| CaptureError::FileNotFound {
            path: path.display().to_string(),
        })?;
        let mut head = [0u8; 4];
        file.read_exact(&mut head)
            .map_err(|_| invalid("file too short for a capture header"))?;
        let compression = Compression::detect(&head);

        // Sniff the container magic through the decompressor, then start over.
        let mut sniff = decoder(path, compression)?;
        let mut magic = [0u8; 4];
        sniff
            .read_exact(&mut magic)
            .map_err(|e| invalid(format!("cannot read capture magic: {e}")))?;
        let format = PcapFormat::detect(&magic)?;
        drop(sniff);

        tracing::debug!(path = %path.display(), %compression, ?format, "Opening capture");
        CaptureReader::with_format(decoder(path, compression)?, format)
    }
}

fn decoder(path: &Path, compression: Compression) -> Result<DecompressReader<File>> {
    let file = File::open(path)?;
    DecompressReader::new(file, compression)
        .map_err(|e| invalid(format!("failed to create {compression} decoder: {e}")))
}

impl<R: Read> CaptureReader<R> {
    /// Create a reader for a source whose format is already known.
    pub fn with_format(source: R, format: PcapFormat) -> Result<Self> {
        let buf_reader = BufReader::with_capacity(BUFFER_SIZE, source);

        let inner = match format {
            PcapFormat::PcapNg => ReaderInner::Ng {
                reader: PcapNGReader::new(BUFFER_SIZE, buf_reader)
                    .map_err(|e| invalid(format!("failed to parse PCAPNG: {e}")))?,
                link_types: Vec::new(),
            },
            PcapFormat::LegacyMicro | PcapFormat::LegacyNano => ReaderInner::Legacy {
                reader: LegacyPcapReader::new(BUFFER_SIZE, buf_reader)
                    .map_err(|e| invalid(format!("failed to parse legacy PCAP: {e}")))?,
                nanos: format == PcapFormat::LegacyNano,
                link_type: DEFAULT_LINK_TYPE,
            },
        };

        Ok(CaptureReader {
            inner,
            frame_number: 0,
        })
    }

    /// Frames read so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_number
    }

    /// Read the next packet; `Ok(None)` at end of file.
    pub fn next_packet(&mut self) -> Result<Option<RawPacket>> {
        match &mut self.inner {
            ReaderInner::Legacy {
                reader,
                nanos,
                link_type,
            } => read_legacy_packet(reader, *nanos, link_type, &mut self.frame_number),
            ReaderInner::Ng { reader, link_types } => {
                read_pcapng_packet(reader, link_types, &mut self.frame_number)
            }
        }
    }
}

impl<R: Read> Iterator for CaptureReader<R> {
    type Item = Result<RawPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_packet().transpose()
    }
}

fn read_legacy_packet<S: Read>(
    reader: &mut LegacyPcapReader<S>,
    nanos: bool,
    link_type: &mut u32,
    frame_number: &mut u64,
) -> Result<Option<RawPacket>> {
    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::Legacy(packet) => {
                    *frame_number += 1;
                    let fraction = if nanos {
                        packet.ts_usec as i64 / 1_000
                    } else {
                        packet.ts_usec as i64
                    };
                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: (packet.ts_sec as i64) * 1_000_000 + fraction,
                        link_type: *link_type,
                        data: Bytes::copy_from_slice(packet.data),
                    };
                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::LegacyHeader(header) => {
                    *link_type = header.network.0 as u32;
                    reader.consume(offset);
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| invalid(format!("legacy PCAP refill error: {e}")))?;
            }
            Err(e) => return Err(invalid(format!("legacy PCAP parse error: {e}"))),
        }
    }
}

fn read_pcapng_packet<S: Read>(
    reader: &mut PcapNGReader<S>,
    link_types: &mut Vec<u32>,
    frame_number: &mut u64,
) -> Result<Option<RawPacket>> {
    use pcap_parser::pcapng::Block;

    loop {
        match reader.next() {
            Ok((offset, block)) => match block {
                PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                    // Interface ids restart in every section.
                    link_types.clear();
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
                    link_types.push(idb.linktype.0 as u32);
                    reader.consume(offset);
                }
                PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
                    *frame_number += 1;
                    // Default if_tsresol (microseconds) assumed
                    let timestamp_us = ((epb.ts_high as i64) << 32) | (epb.ts_low as i64);
                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us,
                        link_type: link_types
                            .get(epb.if_id as usize)
                            .copied()
                            .unwrap_or(DEFAULT_LINK_TYPE),
                        data: Bytes::copy_from_slice(epb.data),
                    };
                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                PcapBlockOwned::NG(Block::SimplePacket(spb)) => {
                    *frame_number += 1;
                    let raw = RawPacket {
                        frame_number: *frame_number,
                        timestamp_us: 0,
                        link_type: link_types.first().copied().unwrap_or(DEFAULT_LINK_TYPE),
                        data: Bytes::copy_from_slice(spb.data),
                    };
                    reader.consume(offset);
                    return Ok(Some(raw));
                }
                _ => reader.consume(offset),
            },
            Err(PcapError::Eof) => return Ok(None),
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| invalid(format!("PCAPNG refill error: {e}")))?;
            }
            Err(e) => return Err(invalid(format!("PCAPNG parse error: {e}"))),
        }
    }
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::Capture(CaptureError::InvalidFormat {
        reason: reason.into(),
    })
}
