use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use crate::archive::{MAX_FILENAME_LEN, SEQUENCE_DIGITS};
use crate::utils::error::{ArchiveError, ArchiveResult};

/// Magic number at the start of every archive file ("ARCH")
pub const FILE_HEADER_MAGIC: u32 = 0x4152_4348;

/// Archive file header format version
pub const FILE_HEADER_VERSION: u16 = 1;

/// Encoded length of the archive file header in bytes
pub const FILE_HEADER_LEN: usize = 32;

/// A string whose length is validated against MAX on every construction,
/// including deserialization of table images
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BoundedString<const MAX: usize>(String);

impl<const MAX: usize> BoundedString<MAX> {
    /// Construct from any string-like value, rejecting oversized input
    pub fn new<S: Into<String>>(value: S) -> ArchiveResult<Self> {
        let value = value.into();
        if value.len() > MAX {
            return Err(ArchiveError::StringTooLong { value, max: MAX });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<const MAX: usize> fmt::Display for BoundedString<MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de, const MAX: usize> Deserialize<'de> for BoundedString<MAX> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

/// How the variable part of a destination filename is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNameType {
    /// Zero-padded sequence counter, incremented on every rotation
    Sequence,

    /// UTC timestamp of the moment the file is opened
    Time,
}

/// Resolve a concrete filename from a destination's naming fields.
///
/// The total qualified length is checked here, at resolution time, because
/// the sequence or timestamp portion is not known at table-edit time.
pub fn resolve_filename(
    path: &str,
    base: &str,
    extension: &str,
    name_type: FileNameType,
    seq: u32,
    stamp: DateTime<Utc>,
) -> ArchiveResult<String> {
    let middle = match name_type {
        FileNameType::Sequence => format!("{:0width$}", seq, width = SEQUENCE_DIGITS),
        // Year, day-of-year, hour, minute, second
        FileNameType::Time => stamp.format("%Y%j%H%M%S").to_string(),
    };

    let mut name = String::with_capacity(MAX_FILENAME_LEN);
    name.push_str(path);
    if !path.is_empty() && !path.ends_with('/') {
        name.push('/');
    }
    name.push_str(base);
    name.push_str(&middle);
    if !extension.is_empty() {
        if !extension.starts_with('.') {
            name.push('.');
        }
        name.push_str(extension);
    }

    if name.len() > MAX_FILENAME_LEN {
        return Err(ArchiveError::FileNameTooLong(name));
    }
    Ok(name)
}

/// Fixed-size header written at the start of every archive file.
///
/// `close_secs` and `file_size` stay zero until the file is closed; the
/// header is rewritten in place when the file is finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveFileHeader {
    pub magic: u32,
    pub version: u16,
    pub dest_index: u16,
    pub create_secs: i64,
    pub close_secs: i64,
    pub file_size: u64,
}

impl ArchiveFileHeader {
    /// Header for a freshly opened file
    pub fn new(dest_index: u16, created: DateTime<Utc>) -> Self {
        Self {
            magic: FILE_HEADER_MAGIC,
            version: FILE_HEADER_VERSION,
            dest_index,
            create_secs: created.timestamp(),
            close_secs: 0,
            file_size: 0,
        }
    }

    /// Encode to the fixed on-disk layout (little endian)
    pub fn encode(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.dest_index.to_le_bytes());
        buf[8..16].copy_from_slice(&self.create_secs.to_le_bytes());
        buf[16..24].copy_from_slice(&self.close_secs.to_le_bytes());
        buf[24..32].copy_from_slice(&self.file_size.to_le_bytes());
        buf
    }

    /// Decode from the fixed on-disk layout
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < FILE_HEADER_LEN {
            return None;
        }
        let header = Self {
            magic: u32::from_le_bytes(buf[0..4].try_into().ok()?),
            version: u16::from_le_bytes(buf[4..6].try_into().ok()?),
            dest_index: u16::from_le_bytes(buf[6..8].try_into().ok()?),
            create_secs: i64::from_le_bytes(buf[8..16].try_into().ok()?),
            close_secs: i64::from_le_bytes(buf[16..24].try_into().ok()?),
            file_size: u64::from_le_bytes(buf[24..32].try_into().ok()?),
        };
        if header.magic != FILE_HEADER_MAGIC {
            return None;
        }
        Some(header)
    }
}
