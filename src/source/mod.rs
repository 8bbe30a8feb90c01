//! Uniform random-access read abstraction over local buffers and remote
//! HTTP ranges.
//!
//! The `ByteSource` trait is the one abstraction every other subsystem is
//! built on: the directory parser, the extractor, and the media gateway
//! never know whether they're reading from memory, a local file, or an
//! HTTP origin. All offset arithmetic is performed by callers; a
//! `ByteSource` itself does not interpret ZIP structure.

mod buffer;
mod local;
mod probe;
mod remote;

pub use buffer::BufferByteSource;
pub use local::LocalFileSource;
pub use probe::{EffectiveEndpoint, ProbeOutcome, probe_capabilities};
pub use remote::RemoteByteSource;

use crate::error::ByteSourceError;
use async_trait::async_trait;
use bytes::Bytes;

/// Tri-state range-support capability: a resource may be known to support
/// byte ranges, known not to, or not yet probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeSupport {
    Yes,
    No,
    Unknown,
}

/// Capability record produced by the probe sequence and carried immutably
/// by a [`RemoteByteSource`] for its lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    /// Total size in bytes, if known.
    pub total_size: Option<u64>,
    /// Whether the resource serves partial content.
    pub supports_ranges: RangeSupport,
}

/// A uniform, random-access, asynchronous byte reader.
///
/// Implementations must be `Send + Sync`: concurrent extractions on the
/// same [`crate::handle::ArchiveHandle`] share one `ByteSource`, and the
/// HTTP variant handles this trivially because every call issues an
/// independent request, while the in-memory variant handles it trivially
/// because reads are pure.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total size of the resource in bytes, if known.
    fn length(&self) -> Option<u64>;

    /// Current capability record.
    fn capability(&self) -> Capability;

    /// Fetch the half-open-inclusive byte range `[start, end_inclusive]`.
    ///
    /// Fails with [`ByteSourceError::RangeUnsupported`] if the resource
    /// cannot serve partial content, [`ByteSourceError::OutOfBounds`] if
    /// `end_inclusive` is beyond a known length, or
    /// [`ByteSourceError::Io`] for transport errors.
    async fn read_range(&self, start: u64, end_inclusive: u64) -> Result<Bytes, ByteSourceError>;

    /// Fetch the entire resource. The default delegates to `read_range`,
    /// which is fine for sources that always support ranges (buffers,
    /// local files). [`RemoteByteSource`] overrides this with a plain GET
    /// carrying no `Range` header, for origins that answer every ranged
    /// request with a full 200.
    async fn read_full(&self) -> Result<Bytes, ByteSourceError> {
        let len = self
            .length()
            .ok_or_else(|| ByteSourceError::Io("resource length is unknown".into()))?;
        if len == 0 {
            return Ok(Bytes::new());
        }
        self.read_range(0, len - 1).await
    }
}
