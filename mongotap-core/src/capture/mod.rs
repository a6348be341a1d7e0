//! Offline capture replay.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌─────────────┐   ┌───────────┐
//! │ .pcap[.gz]   │──▶│ CaptureReader │──▶│ slice_tcp   │──▶│ WireFrame │
//! │ .pcapng[.zst]│   │ (pcap-parser) │   │ (etherparse)│   │ port match│
//! └──────────────┘   └───────────────┘   └─────────────┘   └───────────┘
//! ```
//!
//! Each non-empty TCP payload to or from the configured port becomes one
//! [`WireFrame`]. Segments are not reassembled.

pub mod decompress;
pub mod reader;
pub mod slice;

use std::fs::File;
use std::path::Path;

use tracing::debug;

pub use decompress::{Compression, DecompressReader};
pub use reader::{CaptureReader, PcapFormat, RawPacket};
pub use slice::{slice_tcp, LinkType, Skip, TcpSegment};

use crate::error::{CaptureError, Result};
use crate::source::{FrameSource, WireFrame};

/// Replays a capture file as a stream of MongoDB frames.
pub struct PcapFrameSource<R: std::io::Read = DecompressReader<File>> {
    reader: CaptureReader<R>,
    port: u16,
    skipped: u64,
}

impl PcapFrameSource {
    /// Open `path`, keeping TCP payloads where either port equals `port`.
    pub fn open<P: AsRef<Path>>(path: P, port: u16) -> Result<Self> {
        Ok(Self::new(CaptureReader::open(path)?, port))
    }
}

impl<R: std::io::Read> PcapFrameSource<R> {
    pub fn new(reader: CaptureReader<R>, port: u16) -> Self {
        Self {
            reader,
            port,
            skipped: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Packets read but not turned into frames.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn frame_from(&self, packet: &RawPacket) -> Result<Option<WireFrame>> {
        let link = LinkType::from_pcap(packet.link_type).ok_or_else(|| {
            CaptureError::UnsupportedLinkType {
                link_type: packet.link_type as u16,
            }
        })?;

        let segment = match slice_tcp(link, &packet.data) {
            Ok(segment) => segment,
            Err(Skip::NotTcp) => return Ok(None),
            Err(Skip::Malformed(reason)) => {
                debug!(frame = packet.frame_number, %reason, "Skipping malformed packet");
                return Ok(None);
            }
        };
        if !segment.touches_port(self.port) || segment.payload.is_empty() {
            return Ok(None);
        }

        Ok(Some(WireFrame {
            frame_number: packet.frame_number,
            timestamp_us: packet.timestamp_us,
            src: Some(segment.src),
            dst: Some(segment.dst),
            payload: packet.data.slice_ref(segment.payload),
        }))
    }
}

impl<R: std::io::Read> FrameSource for PcapFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<WireFrame>> {
        while let Some(packet) = self.reader.next_packet()? {
            match self.frame_from(&packet)? {
                Some(frame) => return Ok(Some(frame)),
                None => self.skipped += 1,
            }
        }
        Ok(None)
    }
}
