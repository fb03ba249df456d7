//! Error types for packet decoding

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error types
#[derive(Error, Debug)]
pub enum Error {
    /// Not enough bytes for the structure being read
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Header length field is not 16
    #[error("invalid header length: {0} (expected 16)")]
    InvalidHeaderLength(u16),

    /// Declared packet length is shorter than a header or runs past the buffer
    #[error("invalid packet length {declared} at offset {offset} (buffer holds {available})")]
    InvalidPacketLength {
        declared: u32,
        offset: usize,
        available: usize,
    },

    /// Declared packet length exceeds the configured maximum
    #[error("packet too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),

    /// Body protocol version we cannot decode
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    /// Body is not valid JSON
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inflate or brotli stream is corrupt
    #[error("decompress error: {0}")]
    Decompress(String),

    /// Compressed bodies nested deeper than the decoder allows
    #[error("packet nesting deeper than {0} levels")]
    NestingTooDeep(usize),
}
