use serde::{Deserialize, Serialize};

/// Outcome of a whole-table validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// Used entries that passed every check
    pub good: usize,

    /// Used entries with at least one failed check
    pub bad: usize,

    /// Entries not in use (unused slots are skipped, not checked)
    pub unused: usize,

    /// Description of the first failure encountered, if any
    pub first_error: Option<String>,
}

impl ValidationSummary {
    /// A table is accepted only when no entry failed validation
    pub fn is_ok(&self) -> bool {
        self.bad == 0
    }
}

/// Classification of a single processed packet, reported back to the host
/// for its housekeeping counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "destinations")]
pub enum Disposition {
    /// Written to this many destination files
    Archived(usize),

    /// Matched at least one rule but every instance test failed
    FilteredOut,

    /// Archiving disabled (whole application or every target destination)
    Disabled,

    /// No filter table entry for this packet identifier
    NoRule,
}

/// Point-in-time view of one destination file for telemetry reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestStatusSnapshot {
    /// Destination index
    pub index: usize,

    /// Configured enable state
    pub enabled: bool,

    /// Whether a file is currently open
    pub open: bool,

    /// Resolved name of the current (or last) file
    pub file_name: String,

    /// Packet bytes written to the current file, excluding the header
    pub size: u64,

    /// Seconds the current file has been open
    pub age_secs: u32,

    /// Bytes per second observed over the last management interval
    pub rate: u64,

    /// Sequence number the next sequence-named file will use
    pub seq: u32,
}

/// Running totals maintained by the engine across packets and commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCounters {
    /// Packets archived to at least one destination
    pub accepted: u64,

    /// Total destination writes (one packet may count more than once)
    pub destination_writes: u64,

    /// Packets that matched rules but failed every instance test
    pub filtered: u64,

    /// Packets with no filter table entry
    pub no_rule: u64,

    /// Packets dropped because archiving was disabled
    pub disabled: u64,

    /// File open attempts that failed
    pub open_errors: u64,

    /// File writes (or closes/moves) that failed
    pub write_errors: u64,

    /// Persisted-state save attempts that failed
    pub state_save_errors: u64,
}
