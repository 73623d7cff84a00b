use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Error from I/O operations
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error from JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// An operation needs a table that has not been loaded yet
    #[error("{0} table is not loaded")]
    TableNotLoaded(&'static str),

    /// A write was attempted against a closed destination file
    #[error("destination file is not open")]
    FileNotOpen,

    /// Packet identifier zero is reserved for unused slots
    #[error("packet identifier 0 is reserved")]
    ReservedIdentifier,

    /// Identifier is already present in the filter table
    #[error("packet identifier {0:#06x} is already in the filter table")]
    AlreadyPresent(u32),

    /// No free slot left in the filter table
    #[error("filter table is full")]
    TableFull,

    /// Identifier has no filter table entry
    #[error("packet identifier {0:#06x} not found in the filter table")]
    NotFound(u32),

    /// An index argument is out of range
    #[error("{what} index {index} out of range (max {max})")]
    BadIndex {
        what: &'static str,
        index: usize,
        max: usize,
    },

    /// A field value failed validation
    #[error("bad value: {0}")]
    BadValue(String),

    /// A bounded string exceeds its maximum length
    #[error("string \"{value}\" exceeds maximum length {max}")]
    StringTooLong { value: String, max: usize },

    /// A resolved filename exceeds the qualified-name bound
    #[error("resolved filename \"{0}\" exceeds maximum qualified length")]
    FileNameTooLong(String),
}

/// Result type for application
pub type ArchiveResult<T> = Result<T, ArchiveError>;
