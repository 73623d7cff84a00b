use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the REST API server
    pub port: u16,

    /// Location of the persisted-state file
    pub state_file: PathBuf,

    /// Optional filter table image to load at startup
    pub filter_table: Option<PathBuf>,

    /// Optional destination file table image to load at startup
    pub dest_table: Option<PathBuf>,

    /// Whether archiving starts enabled when no persisted state exists
    pub enable_default: bool,
}
