use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::archive::DEST_COUNT;
use crate::utils::error::ArchiveResult;

/// The flat record that survives a process restart: per-destination
/// sequence counters plus the application enable flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Whether packet archiving is enabled
    pub app_enabled: bool,

    /// Next sequence number per destination, indexed by destination
    pub seq_counts: Vec<u32>,
}

impl PersistedState {
    /// Built-in defaults used on first start or after a restore failure
    pub fn initial(enable_default: bool) -> Self {
        Self {
            app_enabled: enable_default,
            seq_counts: vec![0; DEST_COUNT],
        }
    }
}

/// File-backed durable store for [`PersistedState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Restore the persisted state, or fall back to defaults.
    ///
    /// A missing file is a first-ever startup and seeds the store with the
    /// initial record. An unreadable or unparsable file is logged and
    /// replaced by defaults; it never fails startup.
    pub fn create_or_attach(&self, enable_default: bool) -> PersistedState {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedState>(&bytes) {
                Ok(mut state) => {
                    // Tolerate a store written against a different destination
                    // count; missing counters restart at zero
                    if state.seq_counts.len() != DEST_COUNT {
                        warn!(
                            "Persisted state has {} sequence counters, expected {}; resizing",
                            state.seq_counts.len(),
                            DEST_COUNT
                        );
                        state.seq_counts.resize(DEST_COUNT, 0);
                    }
                    info!("Restored persisted state from {}", self.path.display());
                    state
                }
                Err(e) => {
                    warn!(
                        "Persisted state at {} is unreadable ({}), using defaults",
                        self.path.display(),
                        e
                    );
                    PersistedState::initial(enable_default)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "No persisted state at {}, initializing a new store",
                    self.path.display()
                );
                let state = PersistedState::initial(enable_default);
                if let Err(e) = self.save(&state) {
                    warn!("Failed to initialize persisted state: {}", e);
                }
                state
            }
            Err(e) => {
                warn!(
                    "Failed to read persisted state at {} ({}), using defaults",
                    self.path.display(),
                    e
                );
                PersistedState::initial(enable_default)
            }
        }
    }

    /// Write the state back to the durable store.
    ///
    /// Written to a temporary file and renamed into place so a crash
    /// mid-save cannot leave a truncated store behind.
    pub fn save(&self, state: &PersistedState) -> ArchiveResult<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
