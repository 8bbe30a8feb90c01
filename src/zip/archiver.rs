//! Builds a new ZIP from a selection of entries.
//!
//! Each selected entry is re-fetched through [`EntryExtractor::raw`] and
//! re-encoded (STORED passthrough or fresh DEFLATE via `flate2`'s
//! write-side encoder), then a Local File Header, Central Directory, and
//! EOCD are assembled by hand the same way `structures.rs` parses them.
//!
//! Two short-circuits avoid pointless work: selecting exactly one entry
//! returns that entry's decoded bytes directly with no ZIP container, and
//! selecting every entry in the archive returns the *original* archive
//! bytes unchanged rather than re-encoding byte-for-byte identical data.

use std::io::Write;
use std::sync::Arc;

use bytes::Bytes;

use super::extractor::EntryExtractor;
use super::structures::{CompressionMethod, Entry};
use crate::config::{PolicyConfig, SelectionPolicy};
use crate::error::{ExtractionError, Warning};
use crate::source::ByteSource;

/// What to do about entries selected for archiving above the configured
/// size/count threshold: the caller decides whether to proceed.
pub trait ConfirmationHook: Send + Sync {
    /// Called once, before any fetching begins, when the selection
    /// exceeds [`SelectionPolicy`]'s thresholds. Returning `false`
    /// aborts the build with no further I/O.
    fn confirm(&self, total_bytes: u64, entry_count: usize) -> bool;
}

/// Always proceeds without prompting; used when a caller has already
/// obtained consent out of band (e.g. the CLI, where the flags
/// themselves are the consent).
pub struct AlwaysConfirm;

impl ConfirmationHook for AlwaysConfirm {
    fn confirm(&self, _total_bytes: u64, _entry_count: usize) -> bool {
        true
    }
}

/// Outcome of a selection build: either the assembled bytes, a single
/// passthrough entry's bytes, or the original archive untouched.
pub enum BuiltArchive {
    /// A freshly assembled multi-entry ZIP.
    Zip(Bytes),
    /// The selection was a single entry; its decoded bytes are returned
    /// directly with no ZIP container.
    SingleEntry(Bytes),
    /// The selection covered every entry in the source archive; its
    /// original bytes are returned unchanged.
    OriginalArchive(Bytes),
}

/// Assembles a new archive from a subset of an existing one's entries.
pub struct SurgicalArchiver {
    source: Arc<dyn ByteSource>,
    policy: PolicyConfig,
    selection_policy: SelectionPolicy,
}

impl SurgicalArchiver {
    pub fn new(
        source: Arc<dyn ByteSource>,
        policy: PolicyConfig,
        selection_policy: SelectionPolicy,
    ) -> Self {
        Self {
            source,
            policy,
            selection_policy,
        }
    }

    /// Build an archive containing `selected` (by reference into the
    /// archive's full entry list). `total_entry_count` is the size of
    /// that full list, used to detect the all-entries short-circuit.
    pub async fn build(
        &self,
        selected: &[Entry],
        total_entry_count: usize,
        confirm: &dyn ConfirmationHook,
    ) -> Result<(BuiltArchive, Vec<Warning>), ExtractionError> {
        let total_bytes: u64 = selected.iter().map(|e| e.uncompressed_size).sum();
        if total_bytes > self.selection_policy.confirm_above_bytes
            || selected.len() > self.selection_policy.confirm_above_entries
        {
            if !confirm.confirm(total_bytes, selected.len()) {
                return Err(ExtractionError::SelectionCancelled {
                    total_bytes,
                    entry_count: selected.len(),
                });
            }
        }

        let extractor = EntryExtractor::new(self.source.clone(), self.policy);

        if selected.len() == 1 {
            let entry = &selected[0];
            let bytes = extractor.raw(entry).await?;
            return Ok((BuiltArchive::SingleEntry(bytes), Vec::new()));
        }

        if selected.len() == total_entry_count {
            if let Some(total_size) = self.source.length() {
                let bytes = self.source.read_range(0, total_size - 1).await?;
                return Ok((BuiltArchive::OriginalArchive(bytes), Vec::new()));
            }
        }

        let mut warnings = Vec::new();
        let mut body = Vec::new();
        let mut central_directory = Vec::new();
        let mut central_count: u16 = 0;

        for entry in selected {
            let decoded = match extractor.raw(entry).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warnings.push(Warning::SkippedEntry {
                        path: entry.path.clone(),
                        source: err,
                    });
                    continue;
                }
            };

            let local_offset = body.len() as u32;
            let (method, encoded): (u16, Vec<u8>) = match entry.compression_method {
                CompressionMethod::Stored => (0, decoded.to_vec()),
                CompressionMethod::Deflate | CompressionMethod::Unknown(_) => {
                    let mut encoder = flate2::write::DeflateEncoder::new(
                        Vec::new(),
                        flate2::Compression::default(),
                    );
                    encoder
                        .write_all(&decoded)
                        .map_err(|e| ExtractionError::CorruptDeflate(e.to_string()))?;
                    (
                        8,
                        encoder
                            .finish()
                            .map_err(|e| ExtractionError::CorruptDeflate(e.to_string()))?,
                    )
                }
            };
            let crc = crc32fast::hash(&decoded);
            let name_bytes = entry.path.as_bytes();

            write_local_file_header(
                &mut body,
                method,
                entry.last_mod_time,
                entry.last_mod_date,
                crc,
                encoded.len() as u32,
                decoded.len() as u32,
                name_bytes,
            );
            body.extend_from_slice(&encoded);

            write_central_directory_header(
                &mut central_directory,
                method,
                entry.last_mod_time,
                entry.last_mod_date,
                crc,
                encoded.len() as u32,
                decoded.len() as u32,
                name_bytes,
                local_offset,
            );
            central_count += 1;
        }

        let cd_offset = body.len() as u32;
        let cd_size = central_directory.len() as u32;

        let mut archive = body;
        archive.extend_from_slice(&central_directory);
        write_eocd(&mut archive, central_count, cd_size, cd_offset);

        Ok((BuiltArchive::Zip(Bytes::from(archive)), warnings))
    }
}

#[allow(clippy::too_many_arguments)]
fn write_local_file_header(
    out: &mut Vec<u8>,
    method: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name: &[u8],
) {
    out.extend_from_slice(b"PK\x03\x04");
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&mod_time.to_le_bytes());
    out.extend_from_slice(&mod_date.to_le_bytes());
    out.extend_from_slice(&crc32.to_le_bytes());
    out.extend_from_slice(&compressed_size.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(name);
}

#[allow(clippy::too_many_arguments)]
fn write_central_directory_header(
    out: &mut Vec<u8>,
    method: u16,
    mod_time: u16,
    mod_date: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    name: &[u8],
    local_header_offset: u32,
) {
    out.extend_from_slice(b"PK\x01\x02");
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&20u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&method.to_le_bytes());
    out.extend_from_slice(&mod_time.to_le_bytes());
    out.extend_from_slice(&mod_date.to_le_bytes());
    out.extend_from_slice(&crc32.to_le_bytes());
    out.extend_from_slice(&compressed_size.to_le_bytes());
    out.extend_from_slice(&uncompressed_size.to_le_bytes());
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&local_header_offset.to_le_bytes());
    out.extend_from_slice(name);
}

fn write_eocd(out: &mut Vec<u8>, entry_count: u16, cd_size: u32, cd_offset: u32) {
    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&entry_count.to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferByteSource;
    use crate::zip::directory::DirectoryParser;

    fn build_two_entry_zip() -> Vec<u8> {
        let mut out = Vec::new();
        let mut central_directory = Vec::new();

        for (name, content) in [("a.txt", b"hello".as_slice()), ("b.txt", b"world".as_slice())] {
            let offset = out.len() as u32;
            let crc = crc32fast::hash(content);
            write_local_file_header(&mut out, 0, 0, 0, crc, content.len() as u32, content.len() as u32, name.as_bytes());
            out.extend_from_slice(content);
            write_central_directory_header(
                &mut central_directory,
                0,
                0,
                0,
                crc,
                content.len() as u32,
                content.len() as u32,
                name.as_bytes(),
                offset,
            );
        }

        let cd_offset = out.len() as u32;
        let cd_size = central_directory.len() as u32;
        out.extend_from_slice(&central_directory);
        write_eocd(&mut out, 2, cd_size, cd_offset);
        out
    }

    #[tokio::test]
    async fn single_entry_selection_skips_zip_container() {
        let zip_bytes = build_two_entry_zip();
        let total = zip_bytes.len() as u64;
        let source: Arc<dyn ByteSource> = Arc::new(BufferByteSource::new(zip_bytes));
        let parsed = DirectoryParser::new(source.clone())
            .parse(total)
            .await
            .unwrap();

        let archiver = SurgicalArchiver::new(
            source,
            PolicyConfig::default(),
            SelectionPolicy::default(),
        );
        let selected = vec![parsed.entries[0].clone()];
        let (result, warnings) = archiver
            .build(&selected, parsed.entries.len(), &AlwaysConfirm)
            .await
            .unwrap();
        assert!(warnings.is_empty());
        match result {
            BuiltArchive::SingleEntry(bytes) => assert_eq!(&bytes[..], b"hello"),
            _ => panic!("expected single-entry short-circuit"),
        }
    }

    #[tokio::test]
    async fn all_entries_selection_returns_original_bytes() {
        let zip_bytes = build_two_entry_zip();
        let total = zip_bytes.len() as u64;
        let source: Arc<dyn ByteSource> = Arc::new(BufferByteSource::new(zip_bytes.clone()));
        let parsed = DirectoryParser::new(source.clone())
            .parse(total)
            .await
            .unwrap();

        let archiver = SurgicalArchiver::new(
            source,
            PolicyConfig::default(),
            SelectionPolicy::default(),
        );
        let (result, _) = archiver
            .build(&parsed.entries, parsed.entries.len(), &AlwaysConfirm)
            .await
            .unwrap();
        match result {
            BuiltArchive::OriginalArchive(bytes) => assert_eq!(&bytes[..], &zip_bytes[..]),
            _ => panic!("expected all-entries short-circuit"),
        }
    }

    struct AlwaysDecline;

    impl ConfirmationHook for AlwaysDecline {
        fn confirm(&self, _total_bytes: u64, _entry_count: usize) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn declined_confirmation_is_a_cancellation_not_corruption() {
        let zip_bytes = build_two_entry_zip();
        let total = zip_bytes.len() as u64;
        let source: Arc<dyn ByteSource> = Arc::new(BufferByteSource::new(zip_bytes));
        let parsed = DirectoryParser::new(source.clone())
            .parse(total)
            .await
            .unwrap();

        let mut selection_policy = SelectionPolicy::default();
        selection_policy.confirm_above_entries = 1;
        let archiver = SurgicalArchiver::new(source, PolicyConfig::default(), selection_policy);

        let err = archiver
            .build(&parsed.entries, parsed.entries.len(), &AlwaysDecline)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::SelectionCancelled { entry_count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn partial_selection_builds_a_fresh_valid_zip() {
        let zip_bytes = build_two_entry_zip();
        let total = zip_bytes.len() as u64;
        let source: Arc<dyn ByteSource> = Arc::new(BufferByteSource::new(zip_bytes));
        let parsed = DirectoryParser::new(source.clone())
            .parse(total)
            .await
            .unwrap();

        let archiver = SurgicalArchiver::new(
            source.clone(),
            PolicyConfig::default(),
            SelectionPolicy::default(),
        );
        // Selecting both entries one at a time (not via the full-list
        // slice) exercises the general multi-entry path rather than the
        // all-entries short-circuit.
        let selected = vec![parsed.entries[0].clone(), parsed.entries[1].clone()];
        let (result, warnings) = archiver
            .build(&selected, parsed.entries.len() + 1, &AlwaysConfirm)
            .await
            .unwrap();
        assert!(warnings.is_empty());
        let archive_bytes = match result {
            BuiltArchive::Zip(bytes) => bytes,
            _ => panic!("expected a freshly assembled zip"),
        };

        let rebuilt_source: Arc<dyn ByteSource> =
            Arc::new(BufferByteSource::new(archive_bytes.clone()));
        let reparsed = DirectoryParser::new(rebuilt_source.clone())
            .parse(archive_bytes.len() as u64)
            .await
            .unwrap();
        assert_eq!(reparsed.entries.len(), 2);
        assert_eq!(reparsed.entries[0].path, "a.txt");
        assert_eq!(reparsed.entries[1].path, "b.txt");
    }
}
