//! Error types for binspan

use crate::bgzf::VirtualOffset;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for binspan operations
pub type Result<T> = std::result::Result<T, SpanError>;

/// binspan error types
#[derive(Error, Debug)]
pub enum SpanError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// Malformed block or index data
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Input ended in the middle of a block or index
    #[error("Truncated input: {0}")]
    Truncated(String),

    /// Checksum mismatch
    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// Seek target lies past the end of the addressed block
    #[error("Virtual offset {offset} is outside its block (decompressed length {block_len})")]
    OffsetOutOfBlock {
        offset: VirtualOffset,
        block_len: usize,
    },

    /// The source file cannot be read
    #[error("Could not read source file {path:?}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The side-car index cannot be written next to the source
    #[error("Could not write index file {path:?}: {source}")]
    IndexDirUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The index names a sequence the authoritative dictionary lacks
    #[error("Sequence '{name}' referenced by the index of {path:?} is not in the sequence dictionary")]
    SequenceNotInDictionary { name: String, path: PathBuf },

    /// The source records are not coordinate sorted
    #[error("Source {path:?} is not coordinate sorted: {detail}")]
    UnsortedSource { path: PathBuf, detail: String },

    /// A genomic interval outside the addressable range
    #[error("Invalid interval [{start}, {end})")]
    InvalidInterval { start: u64, end: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violated
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpanError {
    /// Check if the error comes from malformed container or index bytes
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SpanError::InvalidFormat(_)
                | SpanError::Truncated(_)
                | SpanError::ChecksumMismatch { .. }
                | SpanError::Compression(_)
                | SpanError::OffsetOutOfBlock { .. }
        )
    }

    /// Check if the error was caused by user input rather than a bug or corruption
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SpanError::SourceUnreadable { .. }
                | SpanError::IndexDirUnwritable { .. }
                | SpanError::SequenceNotInDictionary { .. }
                | SpanError::UnsortedSource { .. }
                | SpanError::InvalidInterval { .. }
                | SpanError::Config(_)
        )
    }

    /// Check if the error indicates a bug
    pub fn is_internal(&self) -> bool {
        matches!(self, SpanError::Internal(_))
    }

    /// Guidance shown to the user alongside a user error
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            SpanError::SourceUnreadable { .. } => {
                Some("check that the file exists and that you have permission to read it")
            }
            SpanError::IndexDirUnwritable { .. } => Some(
                "make the directory writable or disable automatic index creation; queries still run with an in-memory index",
            ),
            SpanError::SequenceNotInDictionary { .. } => Some(
                "supply the sequence dictionary the file was produced against, or allow missing sequences explicitly",
            ),
            SpanError::UnsortedSource { .. } => {
                Some("sort the records by sequence and start coordinate before indexing")
            }
            SpanError::InvalidInterval { .. } => {
                Some("use 0-based half-open coordinates with start <= end < 2^29")
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for SpanError {
    /// Unwraps errors that crossed a `Read`/`BufRead` boundary as `io::Error`.
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<SpanError>()) {
            if let Some(inner) = err.into_inner() {
                if let Ok(span) = inner.downcast::<SpanError>() {
                    return *span;
                }
            }
            return SpanError::Internal("lost wrapped error".into());
        }
        SpanError::Io(err)
    }
}

impl From<SpanError> for std::io::Error {
    fn from(err: SpanError) -> Self {
        match err {
            SpanError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
