use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};

use crate::archive::name::{
    resolve_filename, ArchiveFileHeader, BoundedString, FileNameType, FILE_HEADER_LEN,
};
use crate::archive::{
    DEST_COUNT, MAX_BASE_LEN, MAX_EXT_LEN, MAX_PATH_LEN, MAX_SEQUENCE_COUNT, MIN_FILE_AGE,
    MIN_FILE_SIZE,
};
use crate::models::status::ValidationSummary;
use crate::utils::error::{ArchiveError, ArchiveResult};

/// Configuration for one destination file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestFileEntry {
    /// Directory closed files are relocated to, if configured
    pub move_path: Option<BoundedString<MAX_PATH_LEN>>,

    /// Directory new files are created in
    pub path: BoundedString<MAX_PATH_LEN>,

    /// Leading portion of every filename
    pub base: BoundedString<MAX_BASE_LEN>,

    /// Filename extension
    pub extension: BoundedString<MAX_EXT_LEN>,

    /// Sequence-count or timestamp naming
    pub name_type: FileNameType,

    /// Disabled destinations silently drop their packets
    pub enabled: bool,

    /// Size-rotation threshold in bytes
    pub max_size: u64,

    /// Age-rotation threshold in seconds
    pub max_age_secs: u32,

    /// Sequence number the next sequence-named file starts from
    pub seq_count: u32,
}

impl Default for DestFileEntry {
    fn default() -> Self {
        Self {
            move_path: None,
            path: BoundedString::default(),
            base: BoundedString::default(),
            extension: BoundedString::default(),
            name_type: FileNameType::Sequence,
            enabled: false,
            max_size: MIN_FILE_SIZE,
            max_age_secs: MIN_FILE_AGE,
            seq_count: 0,
        }
    }
}

impl DestFileEntry {
    fn validate(&self) -> Result<(), String> {
        if self.max_size < MIN_FILE_SIZE {
            return Err(format!(
                "max file size {} below minimum {}",
                self.max_size, MIN_FILE_SIZE
            ));
        }
        if self.max_age_secs < MIN_FILE_AGE {
            return Err(format!(
                "max file age {} below minimum {}",
                self.max_age_secs, MIN_FILE_AGE
            ));
        }
        if self.seq_count > MAX_SEQUENCE_COUNT {
            return Err(format!(
                "sequence count {} above maximum {}",
                self.seq_count, MAX_SEQUENCE_COUNT
            ));
        }
        Ok(())
    }
}

/// Operator-loaded table of destination file configurations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestFileTable {
    /// Free-form table identification, carried but never interpreted
    pub descriptor: String,

    /// One entry per destination; shorter load images are padded with
    /// disabled defaults
    pub entries: Vec<DestFileEntry>,
}

impl DestFileTable {
    /// Validate a whole table image; a single bad entry rejects the table
    pub fn validate(&self) -> ValidationSummary {
        let mut summary = ValidationSummary::default();

        if self.entries.len() > DEST_COUNT {
            summary.bad = self.entries.len();
            summary.first_error = Some(format!(
                "table has {} entries, maximum is {}",
                self.entries.len(),
                DEST_COUNT
            ));
            return summary;
        }
        summary.unused = DEST_COUNT - self.entries.len();

        for (index, entry) in self.entries.iter().enumerate() {
            match entry.validate() {
                Ok(()) => summary.good += 1,
                Err(reason) => {
                    summary.bad += 1;
                    if summary.first_error.is_none() {
                        summary.first_error = Some(format!("destination {}: {}", index, reason));
                    }
                }
            }
        }
        summary
    }

    /// Pad a validated image out to the fixed destination count
    pub fn pad_to_capacity(&mut self) {
        self.entries.resize_with(DEST_COUNT, Default::default);
    }

    fn entry_mut(&mut self, index: usize) -> ArchiveResult<&mut DestFileEntry> {
        if index >= self.entries.len() {
            return Err(ArchiveError::BadIndex {
                what: "destination",
                index,
                max: self.entries.len().saturating_sub(1),
            });
        }
        Ok(&mut self.entries[index])
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> ArchiveResult<()> {
        self.entry_mut(index)?.enabled = enabled;
        Ok(())
    }

    pub fn set_name_type(&mut self, index: usize, name_type: FileNameType) -> ArchiveResult<()> {
        self.entry_mut(index)?.name_type = name_type;
        Ok(())
    }

    pub fn set_max_size(&mut self, index: usize, max_size: u64) -> ArchiveResult<()> {
        if max_size < MIN_FILE_SIZE {
            return Err(ArchiveError::BadValue(format!(
                "max file size {} below minimum {}",
                max_size, MIN_FILE_SIZE
            )));
        }
        self.entry_mut(index)?.max_size = max_size;
        Ok(())
    }

    pub fn set_max_age(&mut self, index: usize, max_age_secs: u32) -> ArchiveResult<()> {
        if max_age_secs < MIN_FILE_AGE {
            return Err(ArchiveError::BadValue(format!(
                "max file age {} below minimum {}",
                max_age_secs, MIN_FILE_AGE
            )));
        }
        self.entry_mut(index)?.max_age_secs = max_age_secs;
        Ok(())
    }

    /// Set the stored sequence count; rollover is rejected, never wrapped
    pub fn set_seq_count(&mut self, index: usize, seq_count: u32) -> ArchiveResult<()> {
        if seq_count > MAX_SEQUENCE_COUNT {
            return Err(ArchiveError::BadValue(format!(
                "sequence count {} above maximum {}",
                seq_count, MAX_SEQUENCE_COUNT
            )));
        }
        self.entry_mut(index)?.seq_count = seq_count;
        Ok(())
    }

    pub fn set_path(&mut self, index: usize, path: &str) -> ArchiveResult<()> {
        let path = BoundedString::new(path)?;
        self.entry_mut(index)?.path = path;
        Ok(())
    }

    pub fn set_base(&mut self, index: usize, base: &str) -> ArchiveResult<()> {
        let base = BoundedString::new(base)?;
        self.entry_mut(index)?.base = base;
        Ok(())
    }

    pub fn set_extension(&mut self, index: usize, extension: &str) -> ArchiveResult<()> {
        let extension = BoundedString::new(extension)?;
        self.entry_mut(index)?.extension = extension;
        Ok(())
    }

    pub fn set_move_path(&mut self, index: usize, move_path: Option<&str>) -> ArchiveResult<()> {
        let move_path = match move_path {
            Some(p) => Some(BoundedString::new(p)?),
            None => None,
        };
        self.entry_mut(index)?.move_path = move_path;
        Ok(())
    }
}

/// Runtime state of one destination file
#[derive(Debug, Default)]
pub struct DestFileStatus {
    /// Open file handle; `None` is the closed state
    file: Option<File>,

    /// Resolved name of the current (or last) file
    pub file_name: String,

    /// Seconds since the current file was opened
    pub age_secs: u32,

    /// Packet bytes written to the current file, excluding the header
    pub size: u64,

    /// Bytes written since the last management pass
    pub growth: u64,

    /// Bytes per second observed over the last management interval
    pub rate: u64,

    /// Sequence number for the next sequence-named file
    pub seq: u32,

    create_secs: i64,
    dest_index: u16,
}

impl DestFileStatus {
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Closed → Open: resolve a filename, create the file, write the
    /// format header and reset the accounting fields.
    ///
    /// On any failure the status stays closed and nothing is mutated; the
    /// next qualifying packet re-attempts the open.
    pub fn open(
        &mut self,
        dest_index: usize,
        entry: &DestFileEntry,
        stamp: DateTime<Utc>,
    ) -> ArchiveResult<()> {
        if self.is_open() {
            return Ok(());
        }

        let name = resolve_filename(
            entry.path.as_str(),
            entry.base.as_str(),
            entry.extension.as_str(),
            entry.name_type,
            self.seq,
            stamp,
        )?;

        let mut file = File::create(&name)?;
        let header = ArchiveFileHeader::new(dest_index as u16, stamp);
        file.write_all(&header.encode())?;

        debug!("Destination {} opened {}", dest_index, name);
        self.file = Some(file);
        self.file_name = name;
        self.age_secs = 0;
        self.size = 0;
        self.growth = 0;
        self.rate = 0;
        self.create_secs = stamp.timestamp();
        self.dest_index = dest_index as u16;
        Ok(())
    }

    /// Open → Open: append one packet's encoded bytes.
    ///
    /// A write failure is reported but leaves the file open; the I/O layer
    /// owns detection of unrecoverable conditions.
    pub fn append(&mut self, data: &[u8]) -> ArchiveResult<()> {
        let file = self.file.as_mut().ok_or(ArchiveError::FileNotOpen)?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        self.growth += data.len() as u64;
        Ok(())
    }

    /// Periodic management pass: age the file and snapshot the byte rate
    /// over the elapsed interval
    pub fn tick(&mut self, elapsed_secs: u32) {
        if !self.is_open() {
            return;
        }
        self.age_secs += elapsed_secs;
        if elapsed_secs > 0 {
            self.rate = self.growth / u64::from(elapsed_secs);
        }
        self.growth = 0;
    }

    /// Open → Closed: finalize the header, release the handle and relocate
    /// the file if a move directory is configured.
    ///
    /// Closing an already-closed destination is a no-op, not an error.
    pub fn close(&mut self, move_path: Option<&str>, stamp: DateTime<Utc>) -> ArchiveResult<()> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => return Ok(()),
        };

        let mut header = ArchiveFileHeader::new(self.dest_index, stamp);
        header.create_secs = self.create_secs;
        header.close_secs = stamp.timestamp();
        // `size` counts payload bytes only; the header records the full
        // on-disk length
        header.file_size = self.size + FILE_HEADER_LEN as u64;

        // The handle is already taken: even a failed finalize leaves the
        // destination closed, and the error is surfaced to the caller
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.flush()?;
        drop(file);

        if let Some(dir) = move_path {
            let base = self
                .file_name
                .rsplit('/')
                .next()
                .unwrap_or(self.file_name.as_str());
            let target = if dir.ends_with('/') {
                format!("{}{}", dir, base)
            } else {
                format!("{}/{}", dir, base)
            };
            fs::rename(&self.file_name, &target)?;
            debug!("Moved closed file {} to {}", self.file_name, target);
            self.file_name = target;
        }
        Ok(())
    }
}
