//! Frame source abstraction.
//!
//! The pipeline only needs "give me the next frame, or tell me the stream
//! ended". [`FrameSource`] captures that; [`PcapFrameSource`] replays a
//! capture file and [`VecFrameSource`] serves frames from memory.
//!
//! [`PcapFrameSource`]: crate::capture::PcapFrameSource

use std::collections::VecDeque;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::Result;

/// One application-layer payload carried by a TCP segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireFrame {
    /// Capture frame number (1-indexed, matching Wireshark)
    pub frame_number: u64,
    /// Capture timestamp in microseconds since the Unix epoch
    pub timestamp_us: i64,
    pub src: Option<SocketAddr>,
    pub dst: Option<SocketAddr>,
    pub payload: Bytes,
}

impl WireFrame {
    /// A frame with no endpoint information.
    pub fn new(frame_number: u64, timestamp_us: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_number,
            timestamp_us,
            src: None,
            dst: None,
            payload: payload.into(),
        }
    }

    pub fn with_endpoints(mut self, src: SocketAddr, dst: SocketAddr) -> Self {
        self.src = Some(src);
        self.dst = Some(dst);
        self
    }
}

/// Sequential, ordered supplier of wire frames.
pub trait FrameSource {
    /// Next frame in arrival order.
    ///
    /// Returns `Ok(None)` at end of stream. An error is fatal to the pipeline.
    fn next_frame(&mut self) -> Result<Option<WireFrame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn next_frame(&mut self) -> Result<Option<WireFrame>> {
        (**self).next_frame()
    }
}

/// In-memory frame source.
#[derive(Debug, Default, Clone)]
pub struct VecFrameSource {
    frames: VecDeque<WireFrame>,
}

impl VecFrameSource {
    pub fn new(frames: impl IntoIterator<Item = WireFrame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn push(&mut self, frame: WireFrame) {
        self.frames.push_back(frame);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecFrameSource {
    fn next_frame(&mut self) -> Result<Option<WireFrame>> {
        Ok(self.frames.pop_front())
    }
}
