//! Error types for Vonnegut
//!
//! One error enum per concern (wire, segment, log, config), composed into
//! a single top-level `Error` via `#[from]`.

use thiserror::Error;

/// Result type alias using Vonnegut's `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("segment error: {0}")]
    Segment(#[from] SegmentError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors decoding/encoding the Kafka-style wire protocol.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("need {0} more bytes to decode a complete frame")]
    NeedMoreBytes(usize),

    #[error("corrupt message: {0}")]
    CorruptMessage(String),

    #[error("unsupported api key: {0}")]
    UnsupportedApiKey(i16),
}

/// Errors reading or writing the on-disk segment format.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("truncated record header at position {0}")]
    TruncatedHeader(u64),

    #[error("truncated record payload at position {0}, wanted {1} bytes, got {2}")]
    TruncatedPayload(u64, usize, usize),

    #[error("index entry out of order: {0}")]
    IndexOutOfOrder(String),

    #[error("segment base offset {0} does not parse as a 20-digit file stem")]
    InvalidBaseOffsetName(String),
}

/// Errors from the partition log state machine (append/roll/recover).
#[derive(Error, Debug)]
pub enum LogError {
    #[error("empty batch")]
    EmptyBatch,

    #[error("segment_bytes {0} exceeds the 24-bit index encoding limit ({1})")]
    SegmentTooLargeFor24BitIndex(i64, i64),

    #[error("index hint for {path} points past the end of the log ({pos_hint} > {log_len})")]
    RecoveryHintBeyondLogEnd {
        path: std::path::PathBuf,
        pos_hint: u64,
        log_len: usize,
    },

    #[error("writer is shutting down")]
    ShuttingDown,
}

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("segment_bytes must be <= {max} (24-bit index encoding limit), got {got}")]
    SegmentBytesTooLarge { got: u64, max: u64 },

    #[error("no log_dirs configured")]
    NoLogDirs,
}
