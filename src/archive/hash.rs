use crate::archive::filter::FilterTable;
use crate::archive::HASH_BUCKETS;

/// Hash index over the filter table's packet identifiers.
///
/// Buckets hold slot indices, never identifier copies; lookups compare
/// against the identifier stored in the table itself. Collisions chain
/// within a bucket in insertion order.
#[derive(Debug, Clone)]
pub struct HashIndex {
    buckets: Vec<Vec<usize>>,
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl HashIndex {
    /// An empty index; every lookup returns `None` until it is built
    pub fn new() -> Self {
        Self {
            buckets: vec![Vec::new(); HASH_BUCKETS],
        }
    }

    // HASH_BUCKETS is a power of two, so the mask is the modulo
    fn bucket_of(packet_id: u32) -> usize {
        packet_id as usize & (HASH_BUCKETS - 1)
    }

    /// Discard all chains and re-index every used slot of the table,
    /// scanned front to back
    pub fn rebuild(&mut self, table: &FilterTable) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        for (slot, entry) in table.entries.iter().enumerate() {
            if !entry.is_unused() {
                self.buckets[Self::bucket_of(entry.packet_id)].push(slot);
            }
        }
    }

    /// Resolve an identifier to its filter table slot
    pub fn find(&self, table: &FilterTable, packet_id: u32) -> Option<usize> {
        if packet_id == 0 {
            return None;
        }
        self.buckets[Self::bucket_of(packet_id)]
            .iter()
            .copied()
            .find(|&slot| {
                table
                    .entries
                    .get(slot)
                    .map(|entry| entry.packet_id == packet_id)
                    .unwrap_or(false)
            })
    }

    /// Index a newly claimed slot without a full rebuild
    pub fn insert(&mut self, packet_id: u32, slot: usize) {
        self.buckets[Self::bucket_of(packet_id)].push(slot);
    }

    /// Drop a slot from its identifier's chain
    pub fn remove(&mut self, packet_id: u32, slot: usize) {
        self.buckets[Self::bucket_of(packet_id)].retain(|&s| s != slot);
    }
}
