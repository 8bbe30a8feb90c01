//! Error types for the ZIP explorer engine.
//!
//! All library errors use `thiserror` for consistent, structured error
//! handling. Each fallible subsystem gets its own enum so callers can match
//! on exactly the failure modes that subsystem can produce; [`EngineError`]
//! wraps all three for call sites (mainly the binaries) that don't need to
//! distinguish them.

use thiserror::Error;

/// Errors produced by a [`crate::source::ByteSource`] implementation.
#[derive(Debug, Error)]
pub enum ByteSourceError {
    /// The resource cannot serve partial content (a ranged request came
    /// back with a full 200 response instead of 206).
    #[error("remote resource does not support range requests")]
    RangeUnsupported,

    /// The requested range lies beyond the resource's known length.
    #[error("requested range {start}-{end} is out of bounds for a {length}-byte resource")]
    OutOfBounds {
        /// Requested start offset.
        start: u64,
        /// Requested inclusive end offset.
        end: u64,
        /// Known total length.
        length: u64,
    },

    /// A network, timeout, or transport-level error occurred.
    #[error("I/O error reading from source: {0}")]
    Io(String),
}

/// Errors produced while locating and parsing the Central Directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No End of Central Directory signature was found.
    #[error("not a ZIP archive: End of Central Directory record not found")]
    NotAZip,

    /// The Central Directory or a ZIP64 structure is truncated or
    /// internally inconsistent.
    #[error("corrupt Central Directory: {0}")]
    CorruptDirectory(String),

    /// Reading the directory region failed at the I/O layer.
    #[error(transparent)]
    Source(#[from] ByteSourceError),
}

/// Errors produced while extracting a single entry.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The Local File Header signature did not match.
    #[error("corrupt Local File Header for entry at offset {0}")]
    CorruptLocalHeader(u64),

    /// The entry's compression method is not STORED or DEFLATE.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The entry exceeds the configured preview size limit.
    #[error("entry too large for preview: {size} bytes exceeds limit of {limit} bytes")]
    EntryTooLarge {
        /// Entry's uncompressed size.
        size: u64,
        /// Configured limit.
        limit: u64,
    },

    /// DEFLATE decoding failed a checksum or length check.
    #[error("corrupt DEFLATE stream: {0}")]
    CorruptDeflate(String),

    /// A caller-supplied confirmation hook declined a selection build
    /// above the size/entry-count threshold. Not a failure of the archive
    /// or the data in it — the caller chose not to proceed.
    #[error("selection build cancelled: {total_bytes} bytes across {entry_count} entries was not confirmed")]
    SelectionCancelled { total_bytes: u64, entry_count: usize },

    /// Reading the entry's bytes failed at the I/O layer.
    #[error(transparent)]
    Source(#[from] ByteSourceError),
}

/// Top-level error type wrapping every subsystem, for callers that don't
/// need to distinguish which layer failed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A [`ByteSourceError`] occurred.
    #[error(transparent)]
    Source(#[from] ByteSourceError),

    /// A [`DirectoryError`] occurred.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// An [`ExtractionError`] occurred.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The requested entry path was not found in the archive.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// The origin doesn't support byte-range requests and is too large to
    /// download in full under the configured policy.
    #[error(
        "{url} does not support range requests and is {size} bytes, over the \
         {limit}-byte full-download limit; try a smaller archive or raise the policy limit"
    )]
    ResourceTooLargeForFullDownload { url: String, size: u64, limit: u64 },

    /// Any other I/O failure (filesystem writes, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal issue encountered while parsing or extracting, surfaced to
/// the caller rather than silently dropped.
///
/// Rather than silently skipping entries that fail during selection-to-ZIP,
/// this crate always makes such skips explicit via this type.
#[derive(Debug, Clone, Error)]
pub enum Warning {
    /// A Central Directory File Header's signature didn't match; parsing
    /// stopped at this point but entries decoded so far are still valid.
    #[error("Central Directory scan stopped at entry {index}: {reason}")]
    CorruptDirectoryEntry {
        /// Index of the entry where the scan stopped.
        index: usize,
        /// Human-readable reason.
        reason: String,
    },

    /// An entry's filename was not valid UTF-8 and was lossily decoded.
    #[error("entry {index} has a non-UTF-8 filename; path is replacement-escaped")]
    NonUtf8FileName {
        /// Index of the affected entry.
        index: usize,
    },

    /// An entry failed extraction during a selection-based operation
    /// (e.g. [`crate::zip::archiver::SurgicalArchiver`]) and was skipped.
    #[error("skipped {path}: {source}")]
    SkippedEntry {
        /// Path of the skipped entry.
        path: String,
        /// Underlying extraction failure.
        #[source]
        source: ExtractionError,
    },
}
