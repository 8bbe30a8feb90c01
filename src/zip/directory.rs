//! Central Directory location and parsing.
//!
//! The EOCD backward scan, ZIP64 locator/EOCD handling, and per-entry
//! sentinel-conditional ZIP64 extra field replacement follow the format's
//! own layout. A signature mismatch mid-scan stops the scan and attaches
//! a [`Warning::CorruptDirectoryEntry`] instead of aborting the whole
//! parse, and a non-UTF-8 filename is tagged rather than silently
//! lossy-decoded.

use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use super::structures::{
    CDFH_MIN_SIZE, CDFH_SIGNATURE, Entry, EndOfCentralDirectory, Zip64EOCD, Zip64EOCDLocator,
};
use crate::error::{DirectoryError, Warning};
use crate::source::ByteSource;

/// Largest comment an EOCD record can carry (u16 max), bounding how far
/// back the tail scan must search.
const MAX_COMMENT_LEN: u64 = 0xFFFF;
/// How many trailing bytes to fetch in one request: EOCD + max comment +
/// room for a preceding ZIP64 locator/EOCD.
const TAIL_SEARCH_WINDOW: u64 = EndOfCentralDirectory::SIZE as u64 + MAX_COMMENT_LEN + 2048;

/// Locates and parses the Central Directory of an archive behind a
/// [`ByteSource`].
pub struct DirectoryParser {
    source: Arc<dyn ByteSource>,
}

/// Parsed directory: the entry list plus any non-fatal warnings collected
/// along the way.
pub struct ParsedDirectory {
    pub entries: Vec<Entry>,
    pub warnings: Vec<Warning>,
}

impl DirectoryParser {
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        Self { source }
    }

    /// Locate the EOCD (and ZIP64 variants if present), then parse the
    /// full Central Directory.
    pub async fn parse(&self, total_size: u64) -> Result<ParsedDirectory, DirectoryError> {
        if total_size < EndOfCentralDirectory::SIZE as u64 {
            return Err(DirectoryError::NotAZip);
        }

        let window = TAIL_SEARCH_WINDOW.min(total_size);
        let tail_start = total_size - window;
        let tail = self
            .source
            .read_range(tail_start, total_size - 1)
            .await?;

        let eocd_pos_in_tail = find_eocd_signature(&tail).ok_or(DirectoryError::NotAZip)?;
        let eocd = EndOfCentralDirectory::from_bytes(&tail[eocd_pos_in_tail..])?;

        let (cd_offset, cd_size, total_entries) = if eocd.is_zip64() {
            let locator_pos = eocd_pos_in_tail
                .checked_sub(Zip64EOCDLocator::SIZE)
                .ok_or_else(|| {
                    DirectoryError::CorruptDirectory(
                        "EOCD signals ZIP64 but no room for a locator precedes it".into(),
                    )
                })?;
            let locator = Zip64EOCDLocator::from_bytes(&tail[locator_pos..])?;

            let eocd64_offset = locator.eocd64_offset;
            let eocd64_tail_pos = eocd64_offset
                .checked_sub(tail_start)
                .filter(|&p| (p as usize) < tail.len());

            let eocd64 = if let Some(pos) = eocd64_tail_pos {
                Zip64EOCD::from_bytes(&tail[pos as usize..])?
            } else {
                // The ZIP64 EOCD sits earlier than our tail window;
                // fetch it directly.
                let probe_len = Zip64EOCD::MIN_SIZE as u64 + 256;
                let end = (eocd64_offset + probe_len - 1).min(total_size - 1);
                let buf = self.source.read_range(eocd64_offset, end).await?;
                Zip64EOCD::from_bytes(&buf)?
            };

            (eocd64.cd_offset, eocd64.cd_size, eocd64.total_entries)
        } else {
            (
                eocd.cd_offset as u64,
                eocd.cd_size as u64,
                eocd.total_entries as u64,
            )
        };

        let cd_bytes = if cd_offset + cd_size <= tail_start {
            self.source
                .read_range(cd_offset, cd_offset + cd_size - 1)
                .await?
        } else if cd_offset >= tail_start {
            let start = (cd_offset - tail_start) as usize;
            let end = start + cd_size as usize;
            if end <= tail.len() {
                tail.slice(start..end)
            } else {
                self.source
                    .read_range(cd_offset, cd_offset + cd_size - 1)
                    .await?
            }
        } else {
            self.source
                .read_range(cd_offset, cd_offset + cd_size - 1)
                .await?
        };

        Ok(parse_central_directory(&cd_bytes, total_entries as usize))
    }
}

fn find_eocd_signature(tail: &[u8]) -> Option<usize> {
    if tail.len() < EndOfCentralDirectory::SIZE {
        return None;
    }
    // Search backward: the EOCD comment can itself contain the
    // signature bytes, so the last real match nearest the end wins.
    let last_possible = tail.len() - EndOfCentralDirectory::SIZE;
    (0..=last_possible)
        .rev()
        .find(|&i| tail[i..i + 4] == *EndOfCentralDirectory::SIGNATURE)
}

/// Parse every Central Directory File Header, recovering from a
/// corrupt/truncated entry by stopping the scan rather than failing the
/// whole parse.
fn parse_central_directory(data: &[u8], expected_entries: usize) -> ParsedDirectory {
    let mut entries = Vec::with_capacity(expected_entries);
    let mut warnings = Vec::new();
    let mut cursor = Cursor::new(data);
    let mut index = 0usize;

    loop {
        if entries.len() >= expected_entries {
            break;
        }
        let start = cursor.position() as usize;
        if start + CDFH_MIN_SIZE > data.len() {
            if start < data.len() {
                warnings.push(Warning::CorruptDirectoryEntry {
                    index,
                    reason: "truncated Central Directory File Header".into(),
                });
            }
            break;
        }

        if &data[start..start + 4] != CDFH_SIGNATURE {
            warnings.push(Warning::CorruptDirectoryEntry {
                index,
                reason: "Central Directory File Header signature mismatch".into(),
            });
            break;
        }

        match parse_one_cdfh(&mut cursor, data) {
            Ok(entry) => {
                if entry.path_is_escaped {
                    warnings.push(Warning::NonUtf8FileName { index });
                }
                entries.push(entry);
            }
            Err(reason) => {
                warnings.push(Warning::CorruptDirectoryEntry { index, reason });
                break;
            }
        }
        index += 1;
    }

    ParsedDirectory { entries, warnings }
}

fn parse_one_cdfh(cursor: &mut Cursor<&[u8]>, data: &[u8]) -> Result<Entry, String> {
    let base = cursor.position() as usize;
    // Skip signature (already checked by caller).
    cursor.set_position((base + 4) as u64);

    let _version_made_by = read_u16(cursor)?;
    let _version_needed = read_u16(cursor)?;
    let _flags = read_u16(cursor)?;
    let compression_method = read_u16(cursor)?;
    let last_mod_time = read_u16(cursor)?;
    let last_mod_date = read_u16(cursor)?;
    let crc32 = read_u32(cursor)?;
    let mut compressed_size = read_u32(cursor)? as u64;
    let mut uncompressed_size = read_u32(cursor)? as u64;
    let name_len = read_u16(cursor)? as usize;
    let extra_len = read_u16(cursor)? as usize;
    let comment_len = read_u16(cursor)? as usize;
    let _disk_number_start = read_u16(cursor)?;
    let _internal_attrs = read_u16(cursor)?;
    let _external_attrs = read_u32(cursor)?;
    let mut local_header_offset = read_u32(cursor)? as u64;

    let name_start = cursor.position() as usize;
    let name_end = name_start + name_len;
    let extra_end = name_end + extra_len;
    let comment_end = extra_end + comment_len;
    if comment_end > data.len() {
        return Err("entry fields extend past end of Central Directory".to_string());
    }

    let name_bytes = &data[name_start..name_end];
    let extra_bytes = &data[name_end..extra_end];

    // ZIP64 extended-information extra field (id 0x0001): fields are
    // present only for the 32-bit values that were set to the ZIP64
    // sentinel (0xFFFFFFFF), in that fixed order.
    if let Some(zip64) = find_zip64_extra(extra_bytes) {
        let mut zc = Cursor::new(zip64);
        if uncompressed_size == 0xFFFFFFFF && let Ok(v) = zc.read_u64::<LittleEndian>() {
            uncompressed_size = v;
        }
        if compressed_size == 0xFFFFFFFF && let Ok(v) = zc.read_u64::<LittleEndian>() {
            compressed_size = v;
        }
        if local_header_offset == 0xFFFFFFFF && let Ok(v) = zc.read_u64::<LittleEndian>() {
            local_header_offset = v;
        }
    }

    cursor.set_position(comment_end as u64);

    Ok(Entry::from_name_and_fields(
        name_bytes,
        compression_method,
        last_mod_time,
        last_mod_date,
        crc32,
        compressed_size,
        uncompressed_size,
        local_header_offset,
    ))
}

/// Find the ZIP64 extended-information field (id `0x0001`) within an
/// entry's extra-field block, and return its value bytes.
fn find_zip64_extra(extra: &[u8]) -> Option<&[u8]> {
    let mut pos = 0usize;
    while pos + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[pos], extra[pos + 1]]);
        let size = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
        let value_start = pos + 4;
        let value_end = value_start + size;
        if value_end > extra.len() {
            return None;
        }
        if id == 0x0001 {
            return Some(&extra[value_start..value_end]);
        }
        pos = value_end;
    }
    None
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, String> {
    let mut buf = [0u8; 2];
    cursor.read_exact(&mut buf).map_err(|e| e.to_string())?;
    Ok(u16::from_le_bytes(buf))
}
fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, String> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf).map_err(|e| e.to_string())?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferByteSource;
    use std::io::Write as _;

    fn build_minimal_zip(name: &str, content: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();

        // Local File Header
        let lfh_offset = 0u32;
        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&20u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0u16.to_le_bytes()); // date
        let crc = crc32fast::hash(content);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.write_all(name.as_bytes()).unwrap();
        out.write_all(content).unwrap();

        let cd_offset = out.len() as u32;

        // Central Directory File Header
        out.extend_from_slice(b"PK\x01\x02");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(content.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // extra len
        out.extend_from_slice(&0u16.to_le_bytes()); // comment len
        out.extend_from_slice(&0u16.to_le_bytes()); // disk start
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        out.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        out.extend_from_slice(&lfh_offset.to_le_bytes());
        out.write_all(name.as_bytes()).unwrap();

        let cd_size = out.len() as u32 - cd_offset;

        // EOCD
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        out
    }

    #[tokio::test]
    async fn parses_single_entry_archive() {
        let zip_bytes = build_minimal_zip("hello.txt", b"hello world");
        let total = zip_bytes.len() as u64;
        let source = Arc::new(BufferByteSource::new(zip_bytes));
        let parser = DirectoryParser::new(source);
        let parsed = parser.parse(total).await.unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].path, "hello.txt");
        assert!(parsed.warnings.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_zip_data() {
        let source = Arc::new(BufferByteSource::new(vec![0u8; 100]));
        let parser = DirectoryParser::new(source);
        let err = parser.parse(100).await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotAZip));
    }

    #[tokio::test]
    async fn rejects_buffer_shorter_than_eocd() {
        let source = Arc::new(BufferByteSource::new(vec![0u8; 10]));
        let parser = DirectoryParser::new(source);
        let err = parser.parse(10).await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotAZip));
    }

    /// A 32-bit `compressed_size` sentinel resolved against the ZIP64
    /// extended-information extra field. The
    /// field carries only the replacements for sentinel-valued fields, in
    /// order (uncompressed, compressed, local-header offset) — here only
    /// `compressed_size` is a sentinel, so the field holds exactly one
    /// 8-byte value.
    #[tokio::test]
    async fn zip64_extra_field_resolves_compressed_size_sentinel() {
        let name = b"big.bin";
        let true_compressed_size: u64 = 0x1_0000_0005; // 4_294_967_301

        let mut cd = Vec::new();
        cd.extend_from_slice(b"PK\x01\x02");
        cd.extend_from_slice(&20u16.to_le_bytes()); // version made by
        cd.extend_from_slice(&45u16.to_le_bytes()); // version needed (zip64)
        cd.extend_from_slice(&0u16.to_le_bytes()); // flags
        cd.extend_from_slice(&0u16.to_le_bytes()); // method: stored
        cd.extend_from_slice(&0u16.to_le_bytes()); // time
        cd.extend_from_slice(&0u16.to_le_bytes()); // date
        cd.extend_from_slice(&0u32.to_le_bytes()); // crc32
        cd.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // compressed size sentinel
        cd.extend_from_slice(&5u32.to_le_bytes()); // uncompressed size (not a sentinel)
        cd.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cd.extend_from_slice(&12u16.to_le_bytes()); // extra field len: 4 header + 8 value
        cd.extend_from_slice(&0u16.to_le_bytes()); // comment len
        cd.extend_from_slice(&0u16.to_le_bytes()); // disk start
        cd.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        cd.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        cd.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        cd.extend_from_slice(name);
        cd.extend_from_slice(&0x0001u16.to_le_bytes()); // zip64 extra id
        cd.extend_from_slice(&8u16.to_le_bytes()); // zip64 extra size
        cd.extend_from_slice(&true_compressed_size.to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&cd);
        let cd_size = out.len() as u32;
        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // cd offset
        out.extend_from_slice(&0u16.to_le_bytes());

        let total = out.len() as u64;
        let source = Arc::new(BufferByteSource::new(out));
        let parsed = DirectoryParser::new(source).parse(total).await.unwrap();

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].compressed_size, true_compressed_size);
        assert_eq!(parsed.entries[0].uncompressed_size, 5);
    }

    /// A ZIP64 EOCD Locator + ZIP64 EOCD record drive Central Directory
    /// location instead of the regular EOCD's 32-bit fields (which carry
    /// the ZIP64 sentinels).
    #[tokio::test]
    async fn zip64_eocd_locator_drives_directory_location() {
        let name = b"a.txt";
        let content = b"hi";
        let crc = crc32fast::hash(content);

        let mut cd = Vec::new();
        cd.extend_from_slice(b"PK\x01\x02");
        cd.extend_from_slice(&20u16.to_le_bytes());
        cd.extend_from_slice(&20u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&crc.to_le_bytes());
        cd.extend_from_slice(&(content.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(content.len() as u32).to_le_bytes());
        cd.extend_from_slice(&(name.len() as u16).to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&0u32.to_le_bytes());
        cd.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        cd.extend_from_slice(name);

        let cd_offset = 0u64;
        let cd_size = cd.len() as u64;

        let mut out = cd;

        let eocd64_offset = out.len() as u64;
        out.extend_from_slice(b"PK\x06\x06");
        out.extend_from_slice(&44u64.to_le_bytes()); // eocd64 record size (excl. sig+size field)
        out.extend_from_slice(&45u16.to_le_bytes()); // version made by
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u32.to_le_bytes()); // disk number
        out.extend_from_slice(&0u32.to_le_bytes()); // disk with cd
        out.extend_from_slice(&1u64.to_le_bytes()); // entries on this disk
        out.extend_from_slice(&1u64.to_le_bytes()); // total entries
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());

        out.extend_from_slice(b"PK\x06\x07");
        out.extend_from_slice(&0u32.to_le_bytes()); // disk with eocd64
        out.extend_from_slice(&eocd64_offset.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes()); // total disks

        out.extend_from_slice(b"PK\x05\x06");
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0xFFFFu16.to_le_bytes()); // sentinel: consult zip64
        out.extend_from_slice(&0xFFFFu16.to_le_bytes());
        out.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        out.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());

        let total = out.len() as u64;
        let source = Arc::new(BufferByteSource::new(out));
        let parsed = DirectoryParser::new(source).parse(total).await.unwrap();

        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].path, "a.txt");
    }
}
