//! Transparent decompression of capture files.
//!
//! Compression is detected from magic bytes, never from the file name.

#[cfg(feature = "compress-zstd")]
use std::io::BufReader;
use std::fmt;
use std::io::{self, Read};

use flate2::read::GzDecoder;

/// Compression wrapping a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    /// Gzip (.gz)
    Gzip,
    /// Zstandard (.zst)
    #[cfg(feature = "compress-zstd")]
    Zstd,
}

impl Compression {
    /// Detect compression from the first bytes of a file.
    pub fn detect(data: &[u8]) -> Self {
        match data {
            [0x1f, 0x8b, ..] => Compression::Gzip,
            #[cfg(feature = "compress-zstd")]
            [0x28, 0xb5, 0x2f, 0xfd, ..] => Compression::Zstd,
            _ => Compression::None,
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Gzip => write!(f, "gzip"),
            #[cfg(feature = "compress-zstd")]
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

/// Reader that undoes [`Compression`], or passes bytes through.
pub enum DecompressReader<R: Read> {
    None(R),
    Gzip(GzDecoder<R>),
    #[cfg(feature = "compress-zstd")]
    Zstd(zstd::Decoder<'static, BufReader<R>>),
}

impl<R: Read> DecompressReader<R> {
    pub fn new(source: R, compression: Compression) -> io::Result<Self> {
        match compression {
            Compression::None => Ok(DecompressReader::None(source)),
            Compression::Gzip => Ok(DecompressReader::Gzip(GzDecoder::new(source))),
            #[cfg(feature = "compress-zstd")]
            Compression::Zstd => Ok(DecompressReader::Zstd(zstd::Decoder::new(source)?)),
        }
    }

    pub fn compression(&self) -> Compression {
        match self {
            DecompressReader::None(_) => Compression::None,
            DecompressReader::Gzip(_) => Compression::Gzip,
            #[cfg(feature = "compress-zstd")]
            DecompressReader::Zstd(_) => Compression::Zstd,
        }
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::None(r) => r.read(buf),
            DecompressReader::Gzip(r) => r.read(buf),
            #[cfg(feature = "compress-zstd")]
            DecompressReader::Zstd(r) => r.read(buf),
        }
    }
}
