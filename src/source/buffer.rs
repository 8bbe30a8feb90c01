//! In-memory `ByteSource`, used for small archives downloaded in full and
//! for tests that stand in for a remote origin.

use async_trait::async_trait;
use bytes::Bytes;

use super::{ByteSource, Capability, RangeSupport};
use crate::error::ByteSourceError;

/// Wraps an in-memory byte buffer as a [`ByteSource`]. Always supports
/// ranges; length is always known.
pub struct BufferByteSource {
    data: Bytes,
}

impl BufferByteSource {
    /// Wrap `data` as a byte source.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ByteSource for BufferByteSource {
    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn capability(&self) -> Capability {
        Capability {
            total_size: self.length(),
            supports_ranges: RangeSupport::Yes,
        }
    }

    async fn read_range(&self, start: u64, end_inclusive: u64) -> Result<Bytes, ByteSourceError> {
        let length = self.data.len() as u64;
        if end_inclusive >= length {
            return Err(ByteSourceError::OutOfBounds {
                start,
                end: end_inclusive,
                length,
            });
        }
        Ok(self
            .data
            .slice(start as usize..=end_inclusive as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_inclusive_range() {
        let source = BufferByteSource::new(Bytes::from_static(b"0123456789"));
        let chunk = source.read_range(2, 4).await.unwrap();
        assert_eq!(&chunk[..], b"234");
    }

    #[tokio::test]
    async fn rejects_out_of_bounds() {
        let source = BufferByteSource::new(Bytes::from_static(b"hello"));
        let err = source.read_range(0, 10).await.unwrap_err();
        assert!(matches!(err, ByteSourceError::OutOfBounds { .. }));
    }
}
