pub mod dest;
pub mod engine;
pub mod filter;
pub mod hash;
pub mod name;
pub mod state;

/// Number of slots in the packet filter table
pub const FILTER_TABLE_ENTRIES: usize = 256;

/// Filter rules carried by each packet filter entry
pub const RULES_PER_ENTRY: usize = 4;

/// Number of independently rotated destination files
pub const DEST_COUNT: usize = 16;

/// Buckets in the packet identifier hash index (must be a power of two)
pub const HASH_BUCKETS: usize = 128;

/// Smallest accepted size-rotation threshold, in bytes
pub const MIN_FILE_SIZE: u64 = 256;

/// Smallest accepted age-rotation threshold, in seconds
pub const MIN_FILE_AGE: u32 = 60;

/// Largest sequence count representable in the filename field
pub const MAX_SEQUENCE_COUNT: u32 = 99_999_999;

/// Zero-padded digits used for sequence-named files
pub const SEQUENCE_DIGITS: usize = 8;

/// Maximum length of a destination path or move-path string
pub const MAX_PATH_LEN: usize = 64;

/// Maximum length of a destination base-name string
pub const MAX_BASE_LEN: usize = 32;

/// Maximum length of a destination extension string
pub const MAX_EXT_LEN: usize = 8;

/// Maximum length of a fully resolved, qualified filename
pub const MAX_FILENAME_LEN: usize = 96;
