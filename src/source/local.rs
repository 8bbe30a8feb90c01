//! Local filesystem `ByteSource`, used by the CLI when given a plain
//! filesystem path rather than an HTTP(S) URL.
//!
//! A pragmatic third implementation alongside the in-memory and remote
//! sources, needed by the CLI host for local archives. Uses a
//! platform-specific positioned read so concurrent reads need no shared
//! seek cursor.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use super::{ByteSource, Capability, RangeSupport};
use crate::error::ByteSourceError;

/// Random-access reader over a local file.
pub struct LocalFileSource {
    file: std::fs::File,
    size: u64,
}

impl LocalFileSource {
    /// Open `path` read-only and cache its size.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }
}

#[async_trait]
impl ByteSource for LocalFileSource {
    fn length(&self) -> Option<u64> {
        Some(self.size)
    }

    fn capability(&self) -> Capability {
        Capability {
            total_size: Some(self.size),
            supports_ranges: RangeSupport::Yes,
        }
    }

    async fn read_range(&self, start: u64, end_inclusive: u64) -> Result<Bytes, ByteSourceError> {
        if end_inclusive >= self.size {
            return Err(ByteSourceError::OutOfBounds {
                start,
                end: end_inclusive,
                length: self.size,
            });
        }
        let len = (end_inclusive - start + 1) as usize;
        let mut buf = vec![0u8; len];

        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file
                .read_exact_at(&mut buf, start)
                .map_err(|e| ByteSourceError::Io(e.to_string()))?;
        }

        #[cfg(windows)]
        {
            use std::io::{Read, Seek, SeekFrom};
            use std::os::windows::io::{AsRawHandle, FromRawHandle};
            // SAFETY: a new File is created from the same raw handle and
            // immediately forgotten so the original retains ownership.
            let mut file = unsafe { std::fs::File::from_raw_handle(self.file.as_raw_handle()) };
            file.seek(SeekFrom::Start(start))
                .map_err(|e| ByteSourceError::Io(e.to_string()))?;
            file.read_exact(&mut buf)
                .map_err(|e| ByteSourceError::Io(e.to_string()))?;
            std::mem::forget(file);
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(start))
                .map_err(|e| ByteSourceError::Io(e.to_string()))?;
            file.read_exact(&mut buf)
                .map_err(|e| ByteSourceError::Io(e.to_string()))?;
        }

        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_a_range_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"the quick brown fox").unwrap();
        let source = LocalFileSource::open(file.path()).unwrap();
        let chunk = source.read_range(4, 8).await.unwrap();
        assert_eq!(&chunk[..], b"quick");
    }
}
