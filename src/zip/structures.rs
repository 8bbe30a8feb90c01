//! ZIP file format data structures.
//!
//! The EOCD/ZIP64/CDFH layouts are fixed binary formats, so the
//! fixed-field parsing logic is straightforward fixed-offset reads.
//! [`Entry`] carries the fields a directory listing needs to present
//! and resolve an archive member (`path`/`name` split, `crc32`,
//! `path_is_escaped`, civil-datetime `last_modified`).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::DirectoryError;

/// ZIP compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression (method 0).
    Stored,
    /// DEFLATE compression (method 8).
    Deflate,
    /// Unknown or unsupported compression method.
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) record.
///
/// | Offset | Size | Description |
/// |--------|------|-------------|
/// | 0 | 4 | Signature (0x06054b50) |
/// | 4 | 2 | Disk number |
/// | 6 | 2 | Disk with Central Directory |
/// | 8 | 2 | Entries on this disk |
/// | 10 | 2 | Total entries |
/// | 12 | 4 | Central Directory size |
/// | 16 | 4 | Central Directory offset |
/// | 20 | 2 | Comment length |
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self, DirectoryError> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(DirectoryError::NotAZip);
        }
        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            disk_number: read_u16(&mut cursor)?,
            disk_with_cd: read_u16(&mut cursor)?,
            disk_entries: read_u16(&mut cursor)?,
            total_entries: read_u16(&mut cursor)?,
            cd_size: read_u32(&mut cursor)?,
            cd_offset: read_u32(&mut cursor)?,
            comment_len: read_u16(&mut cursor)?,
        })
    }

    /// `true` if any field signals that ZIP64 extensions must be consulted
    /// for the real value.
    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator (20 bytes), immediately
/// preceding the regular EOCD in a ZIP64 archive.
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self, DirectoryError> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(DirectoryError::CorruptDirectory(
                "invalid ZIP64 End of Central Directory Locator".into(),
            ));
        }
        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            disk_with_eocd64: read_u32(&mut cursor)?,
            eocd64_offset: read_u64(&mut cursor)?,
            total_disks: read_u32(&mut cursor)?,
        })
    }
}

/// ZIP64 End of Central Directory record (56 bytes minimum).
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self, DirectoryError> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(DirectoryError::CorruptDirectory(
                "invalid ZIP64 End of Central Directory record".into(),
            ));
        }
        let mut cursor = Cursor::new(&data[4..]);
        Ok(Self {
            eocd64_size: read_u64(&mut cursor)?,
            version_made_by: read_u16(&mut cursor)?,
            version_needed: read_u16(&mut cursor)?,
            disk_number: read_u32(&mut cursor)?,
            disk_with_cd: read_u32(&mut cursor)?,
            disk_entries: read_u64(&mut cursor)?,
            total_entries: read_u64(&mut cursor)?,
            cd_size: read_u64(&mut cursor)?,
            cd_offset: read_u64(&mut cursor)?,
        })
    }
}

/// Central Directory File Header signature: "PK\x01\x02"
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
/// Minimum size of a Central Directory File Header.
pub const CDFH_MIN_SIZE: usize = 46;
/// Local File Header signature: "PK\x03\x04"
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
/// Size of the fixed portion of a Local File Header.
pub const LFH_SIZE: usize = 30;

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, DirectoryError> {
    cursor
        .read_u16::<LittleEndian>()
        .map_err(|e| DirectoryError::CorruptDirectory(e.to_string()))
}
fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, DirectoryError> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| DirectoryError::CorruptDirectory(e.to_string()))
}
fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, DirectoryError> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| DirectoryError::CorruptDirectory(e.to_string()))
}

/// Convert a DOS date+time pair into a civil datetime. Out-of-range
/// fields are retained as-is rather than rejected — the consumer
/// decides presentation — so this returns
/// `None` only when chrono itself cannot represent the combination (e.g.
/// month 0 or day 32), in which case callers fall back to the raw tuple.
pub fn dos_to_civil(date: u16, time: u16) -> Option<chrono::NaiveDateTime> {
    let year = 1980 + ((date >> 9) & 0x7F) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = ((time >> 11) & 0x1F) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) * 2) as u32;

    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(chrono::NaiveDateTime::new(date, time))
}

/// One archive member, parsed from a Central Directory File Header.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Full path as stored in the archive (`/`-separated, may end in `/`
    /// for a directory).
    pub path: String,
    /// Last non-empty path segment.
    pub name: String,
    /// `true` if `path` names a directory (trailing `/`).
    pub is_directory: bool,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    /// Absolute offset of this entry's Local File Header.
    pub local_header_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    /// `true` if the filename bytes were not valid UTF-8 and were
    /// lossily (replacement-character) decoded.
    pub path_is_escaped: bool,
}

impl Entry {
    /// Civil (year, month, day), per the DOS date conversion rule.
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Civil (hour, minute, second), per the DOS time conversion rule.
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    /// Civil datetime, falling back to the epoch if the DOS fields don't
    /// form a representable date (out-of-range fields are kept, not
    /// rejected).
    pub fn last_modified(&self) -> chrono::NaiveDateTime {
        dos_to_civil(self.last_mod_date, self.last_mod_time).unwrap_or_else(|| {
            chrono::NaiveDateTime::new(
                chrono::NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
                chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            )
        })
    }

    pub(crate) fn from_name_and_fields(
        name_bytes: &[u8],
        compression_method: u16,
        last_mod_time: u16,
        last_mod_date: u16,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        local_header_offset: u64,
    ) -> Self {
        let (path, path_is_escaped) = match std::str::from_utf8(name_bytes) {
            Ok(s) => (s.to_string(), false),
            Err(_) => (String::from_utf8_lossy(name_bytes).to_string(), true),
        };
        let is_directory = path.ends_with('/');
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&path)
            .to_string();

        Self {
            path,
            name,
            is_directory,
            compression_method: CompressionMethod::from_u16(compression_method),
            compressed_size,
            uncompressed_size,
            crc32,
            local_header_offset,
            last_mod_time,
            last_mod_date,
            path_is_escaped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dos_datetime_conversion() {
        // 2024-03-15 13:37:42, encoded per the DOS bit layout.
        let date = ((2024 - 1980) << 9) | (3 << 5) | 15;
        let time = (13 << 11) | (37 << 5) | (42 / 2);
        let dt = dos_to_civil(date as u16, time as u16).unwrap();
        assert_eq!(dt.to_string(), "2024-03-15 13:37:42");
    }

    #[test]
    fn directory_entries_detected_by_trailing_slash() {
        let entry = Entry::from_name_and_fields(b"assets/images/", 0, 0, 0, 0, 0, 0, 0);
        assert!(entry.is_directory);
        assert_eq!(entry.name, "images");
        assert_eq!(entry.path, "assets/images/");
    }

    #[test]
    fn non_utf8_name_is_marked_escaped() {
        let entry = Entry::from_name_and_fields(&[0xff, 0xfe, b'a'], 0, 0, 0, 0, 0, 0, 0);
        assert!(entry.path_is_escaped);
    }
}
