use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A telemetry or command packet delivered by the message-bus collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivePacket {
    /// Mission-defined packet identifier; zero never matches a filter entry
    pub packet_id: u32,

    /// Timestamp embedded in the packet, used by time-based filtering
    /// and time-named files
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// The encoded packet bytes, archived verbatim
    pub data: Vec<u8>,
}

impl ArchivePacket {
    /// Encoded length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
