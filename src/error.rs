//! Unified error types for rtmp-ingest

use std::io;

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all RTMP operations
///
/// Every variant except [`Error::Usage`] is fatal to the connection that
/// produced it. `Usage` is returned to the caller of an encoder entry point
/// and leaves the connection intact.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Handshake failure
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// RTMP protocol violation by the peer
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// AMF0 encoding/decoding error
    #[error("AMF0 error: {0}")]
    Amf(#[from] AmfError),

    /// Caller supplied an out-of-range argument to an encoder
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// A configured read or write deadline expired
    #[error("operation timed out")]
    Timeout,

    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// The parent context was cancelled
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this termination should be logged as an error.
    ///
    /// Cancellation and an orderly peer close are normal shutdown paths.
    pub fn is_failure(&self) -> bool {
        !matches!(self, Error::Cancelled | Error::ConnectionClosed)
    }
}

/// Handshake-specific errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// C0 carried a version other than 3
    #[error("unsupported RTMP version: {0}")]
    InvalidVersion(u8),

    /// C2 did not echo the random block we sent in S1
    #[error("C2 did not acknowledge the S1 random block")]
    AckMismatch,
}

/// Protocol-level errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Malformed chunk header
    #[error("invalid chunk header")]
    InvalidChunkHeader,

    /// Type 1/2/3 chunk arrived on a chunk stream with no prior type 0
    #[error("chunk stream {0}: compressed header with no prior chunk")]
    NoPriorChunk(u32),

    /// Declared message length exceeds the configured cap
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },

    /// Peer requested a chunk size outside the representable range
    #[error("chunk size out of range: {0}")]
    ChunkSizeOutOfRange(u32),

    /// Control message payload shorter than its fixed layout
    #[error("truncated control message (type {0})")]
    TruncatedControl(u8),

    /// Command message payload did not have the expected shape
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// AMF0 encoding/decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmfError {
    /// Buffer ended inside a value
    #[error("unexpected end of AMF0 data")]
    UnexpectedEof,

    /// Type marker not in the supported grammar
    #[error("unknown AMF0 marker: 0x{0:02x}")]
    UnknownMarker(u8),

    /// String bytes were not valid UTF-8
    #[error("invalid UTF-8 in AMF0 string")]
    InvalidUtf8,

    /// Zero-length key not followed by the object-end marker
    #[error("missing AMF0 object end marker")]
    MissingObjectEnd,

    /// Encoder-side: string or key does not fit the 16-bit length field
    #[error("AMF0 string too long: {0} bytes (max 65534)")]
    StringTooLong(usize),
}

/// Encoder-side caller errors. Unlike protocol errors these do not close
/// the connection; they are returned to the caller that supplied the value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// Chunk stream ids 0 and 1 are encoding markers; 65599 is the 3-byte cap
    #[error("chunk stream id out of range: {0} (valid: 2..=65599)")]
    ChunkStreamIdOutOfRange(u32),

    /// Message payload does not fit the 24-bit length field
    #[error("message payload too long: {0} bytes (max 0xFFFFFF)")]
    PayloadTooLong(usize),
}
