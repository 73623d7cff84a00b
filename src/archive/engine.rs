use chrono::Utc;
use log::{info, warn};

use crate::archive::dest::{DestFileStatus, DestFileTable};
use crate::archive::filter::{FilterTable, FilterType};
use crate::archive::hash::HashIndex;
use crate::archive::name::FileNameType;
use crate::archive::state::{PersistedState, StateStore};
use crate::archive::{DEST_COUNT, FILTER_TABLE_ENTRIES, MAX_SEQUENCE_COUNT};
use crate::models::config::AppConfig;
use crate::models::packet::ArchivePacket;
use crate::models::status::{ArchiveCounters, DestStatusSnapshot, Disposition, ValidationSummary};
use crate::utils::error::{ArchiveError, ArchiveResult};

/// Outcome of one destination write attempt
enum WriteOutcome {
    Written,
    DestDisabled,
    Failed,
}

/// The packet-filter resolution engine and destination-file lifecycle
/// manager.
///
/// Owns both configuration tables, the hash index over the filter table,
/// per-destination runtime status, per-identifier instance counters and the
/// persisted state. Constructed once at startup and driven synchronously by
/// the host: once per inbound packet, once per management tick, once per
/// operator command.
pub struct ArchiveEngine {
    filter_table: Option<FilterTable>,
    dest_table: Option<DestFileTable>,
    hash: HashIndex,
    status: Vec<DestFileStatus>,
    /// Per-slot instance counters for count-based filtering; reset to zero
    /// whenever a filter table is loaded and deliberately not persisted
    instance_counts: Vec<u32>,
    state: PersistedState,
    store: StateStore,
    counters: ArchiveCounters,
}

impl ArchiveEngine {
    /// Build the engine, attaching to (or creating) the persisted state
    /// and restoring sequence counters and the enable flag from it
    pub fn new(config: &AppConfig) -> Self {
        let store = StateStore::new(config.state_file.clone());
        let state = store.create_or_attach(config.enable_default);

        let mut status: Vec<DestFileStatus> =
            (0..DEST_COUNT).map(|_| DestFileStatus::default()).collect();
        for (dest, entry) in status.iter_mut().enumerate() {
            entry.seq = state.seq_counts[dest];
        }

        info!(
            "Archive engine initialized, archiving {}",
            if state.app_enabled { "enabled" } else { "disabled" }
        );

        Self {
            filter_table: None,
            dest_table: None,
            hash: HashIndex::new(),
            status,
            instance_counts: vec![0; FILTER_TABLE_ENTRIES],
            state,
            store,
            counters: ArchiveCounters::default(),
        }
    }

    /// Whether packet archiving is enabled
    pub fn app_enabled(&self) -> bool {
        self.state.app_enabled
    }

    /// Enable or disable archiving; the new state is persisted
    pub fn set_app_enabled(&mut self, enabled: bool) {
        info!("Archiving {}", if enabled { "enabled" } else { "disabled" });
        self.state.app_enabled = enabled;
        self.persist();
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.state) {
            self.counters.state_save_errors += 1;
            warn!("Failed to save persisted state: {}", e);
        }
    }

    /// Validate and, on success, swap in a new filter table image.
    ///
    /// The prior table stays authoritative when validation fails. A
    /// successful load rebuilds the hash index and resets every instance
    /// counter to zero (reset-on-reload is a documented limitation of
    /// count-based filtering).
    pub fn load_filter_table(&mut self, mut table: FilterTable) -> ValidationSummary {
        let summary = table.validate(DEST_COUNT);
        if !summary.is_ok() {
            warn!(
                "Filter table \"{}\" rejected: {}",
                table.descriptor,
                summary.first_error.as_deref().unwrap_or("unknown error")
            );
            return summary;
        }

        table.pad_to_capacity();
        self.hash.rebuild(&table);
        self.instance_counts.iter_mut().for_each(|c| *c = 0);
        info!(
            "Filter table \"{}\" loaded: {} used, {} unused entries",
            table.descriptor, summary.good, summary.unused
        );
        self.filter_table = Some(table);
        summary
    }

    /// Validate and, on success, swap in a new destination table image.
    ///
    /// All open files are force-closed first. Runtime sequence counters are
    /// re-seeded from the larger of the table value and the persisted value
    /// so a reload never rewinds file numbering.
    pub fn load_dest_table(&mut self, mut table: DestFileTable) -> ValidationSummary {
        let summary = table.validate();
        if !summary.is_ok() {
            warn!(
                "Destination table \"{}\" rejected: {}",
                table.descriptor,
                summary.first_error.as_deref().unwrap_or("unknown error")
            );
            return summary;
        }

        self.close_all();
        table.pad_to_capacity();
        for (dest, entry) in table.entries.iter().enumerate() {
            let seq = entry.seq_count.max(self.state.seq_counts[dest]);
            self.status[dest].seq = seq;
            self.state.seq_counts[dest] = seq;
        }
        self.persist();
        info!("Destination table \"{}\" loaded", table.descriptor);
        self.dest_table = Some(table);
        summary
    }

    /// Current filter table image, if loaded
    pub fn filter_table(&self) -> Option<&FilterTable> {
        self.filter_table.as_ref()
    }

    /// Current destination table image, if loaded
    pub fn dest_table(&self) -> Option<&DestFileTable> {
        self.dest_table.as_ref()
    }

    /// Process one inbound packet through filter resolution and, per
    /// passing rule, the destination state machine
    pub fn process_packet(&mut self, packet: &ArchivePacket) -> Disposition {
        if !self.state.app_enabled {
            self.counters.disabled += 1;
            return Disposition::Disabled;
        }

        let slot = match &self.filter_table {
            Some(table) => self.hash.find(table, packet.packet_id),
            None => None,
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                self.counters.no_rule += 1;
                return Disposition::NoRule;
            }
        };

        // One counter per identifier, bumped once per instance no matter
        // how many rules it has or how they decide
        let count = self.instance_counts[slot];
        self.instance_counts[slot] = count.wrapping_add(1);

        let rules = self
            .filter_table
            .as_ref()
            .map(|table| table.entries[slot].rules)
            .unwrap_or_default();

        let mut written = 0usize;
        let mut attempted = false;
        let mut hit_disabled = false;

        for rule in rules.iter().filter(|rule| !rule.is_unused()) {
            let value = match rule.filter_type {
                FilterType::ByCount => count,
                FilterType::ByTime => packet.timestamp.timestamp() as u32,
            };
            if !rule.passes(value) {
                continue;
            }

            let dest = usize::from(rule.dest_index.unwrap_or_default());
            match self.archive_to(dest, packet) {
                WriteOutcome::Written => {
                    attempted = true;
                    written += 1;
                }
                WriteOutcome::Failed => attempted = true,
                WriteOutcome::DestDisabled => hit_disabled = true,
            }
        }

        if written > 0 || attempted {
            if written > 0 {
                self.counters.accepted += 1;
                self.counters.destination_writes += written as u64;
            }
            Disposition::Archived(written)
        } else if hit_disabled {
            self.counters.disabled += 1;
            Disposition::Disabled
        } else {
            self.counters.filtered += 1;
            Disposition::FilteredOut
        }
    }

    /// Write one packet to one destination, opening the file first if
    /// needed and rotating afterwards if the size threshold is reached
    fn archive_to(&mut self, dest: usize, packet: &ArchivePacket) -> WriteOutcome {
        let entry = match &self.dest_table {
            // No destination table loaded: nothing may be opened
            None => return WriteOutcome::DestDisabled,
            Some(table) => &table.entries[dest],
        };
        if !entry.enabled {
            return WriteOutcome::DestDisabled;
        }
        let max_size = entry.max_size;

        let status = &mut self.status[dest];
        if !status.is_open() {
            if let Err(e) = status.open(dest, entry, packet.timestamp) {
                self.counters.open_errors += 1;
                warn!("Destination {} open failed: {}", dest, e);
                return WriteOutcome::Failed;
            }
        }

        // A failed write leaves the file open; the next packet retries
        if let Err(e) = self.status[dest].append(&packet.data) {
            self.counters.write_errors += 1;
            warn!("Destination {} write failed: {}", dest, e);
            return WriteOutcome::Failed;
        }

        if self.status[dest].size >= max_size {
            self.rotate(dest);
        }
        WriteOutcome::Written
    }

    /// Close a destination's file and advance its sequence numbering.
    ///
    /// Idempotent: rotating an already-closed destination does nothing.
    fn rotate(&mut self, dest: usize) {
        if !self.status[dest].is_open() {
            return;
        }

        let (move_path, name_type) = match &self.dest_table {
            Some(table) => {
                let entry = &table.entries[dest];
                (
                    entry.move_path.as_ref().map(|p| p.as_str().to_string()),
                    entry.name_type,
                )
            }
            None => (None, FileNameType::Sequence),
        };

        if let Err(e) = self.status[dest].close(move_path.as_deref(), Utc::now()) {
            self.counters.write_errors += 1;
            warn!("Destination {} close failed: {}", dest, e);
        }

        if name_type == FileNameType::Sequence {
            let next = if self.status[dest].seq >= MAX_SEQUENCE_COUNT {
                warn!("Destination {} sequence count wrapped to zero", dest);
                0
            } else {
                self.status[dest].seq + 1
            };
            self.status[dest].seq = next;
            self.state.seq_counts[dest] = next;
            self.persist();
        }
    }

    /// Periodic management pass: age every open file, snapshot byte rates
    /// and rotate any file that reached its age threshold
    pub fn management_tick(&mut self, elapsed_secs: u32) {
        for dest in 0..DEST_COUNT {
            self.status[dest].tick(elapsed_secs);

            let max_age = match &self.dest_table {
                Some(table) => table.entries[dest].max_age_secs,
                None => continue,
            };
            if self.status[dest].is_open() && self.status[dest].age_secs >= max_age {
                info!("Destination {} reached its age threshold", dest);
                self.rotate(dest);
            }
        }
    }

    /// Explicit close command for one destination
    pub fn close_dest(&mut self, dest: usize) -> ArchiveResult<()> {
        if dest >= DEST_COUNT {
            return Err(ArchiveError::BadIndex {
                what: "destination",
                index: dest,
                max: DEST_COUNT - 1,
            });
        }
        self.rotate(dest);
        Ok(())
    }

    /// Explicit close command for every destination
    pub fn close_all(&mut self) {
        for dest in 0..DEST_COUNT {
            self.rotate(dest);
        }
    }

    /// Close all files and save state; called at shutdown
    pub fn shutdown(&mut self) {
        self.close_all();
        self.persist();
    }

    fn require_filter(&self) -> ArchiveResult<&FilterTable> {
        self.filter_table
            .as_ref()
            .ok_or(ArchiveError::TableNotLoaded("filter"))
    }

    fn resolve(&self, packet_id: u32) -> ArchiveResult<usize> {
        self.hash
            .find(self.require_filter()?, packet_id)
            .ok_or(ArchiveError::NotFound(packet_id))
    }

    /// Claim a filter table slot for a new identifier and index it
    pub fn add_identifier(&mut self, packet_id: u32) -> ArchiveResult<usize> {
        if packet_id == 0 {
            return Err(ArchiveError::ReservedIdentifier);
        }
        if self.hash.find(self.require_filter()?, packet_id).is_some() {
            return Err(ArchiveError::AlreadyPresent(packet_id));
        }

        let table = self
            .filter_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("filter"))?;
        let slot = table.claim_slot(packet_id)?;
        self.hash.insert(packet_id, slot);
        self.instance_counts[slot] = 0;
        info!("Added packet identifier {:#06x} at slot {}", packet_id, slot);
        Ok(slot)
    }

    /// Remove an identifier's filter table entry; removing an identifier
    /// that was never added is an error, not a no-op
    pub fn remove_identifier(&mut self, packet_id: u32) -> ArchiveResult<()> {
        let slot = self.resolve(packet_id)?;
        let table = self
            .filter_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("filter"))?;
        table.clear_slot(slot);
        self.hash.remove(packet_id, slot);
        info!("Removed packet identifier {:#06x}", packet_id);
        Ok(())
    }

    /// Point one of an identifier's rules at a destination
    pub fn set_rule_dest(
        &mut self,
        packet_id: u32,
        rule_index: usize,
        dest_index: Option<u16>,
    ) -> ArchiveResult<()> {
        let slot = self.resolve(packet_id)?;
        self.filter_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("filter"))?
            .set_rule_dest(slot, rule_index, dest_index, DEST_COUNT)
    }

    /// Switch one of an identifier's rules between count and time filtering
    pub fn set_rule_type(
        &mut self,
        packet_id: u32,
        rule_index: usize,
        filter_type: FilterType,
    ) -> ArchiveResult<()> {
        let slot = self.resolve(packet_id)?;
        self.filter_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("filter"))?
            .set_rule_type(slot, rule_index, filter_type)
    }

    /// Replace the N/X/O parameters of one of an identifier's rules
    pub fn set_rule_params(
        &mut self,
        packet_id: u32,
        rule_index: usize,
        n: u16,
        x: u16,
        o: u16,
    ) -> ArchiveResult<()> {
        let slot = self.resolve(packet_id)?;
        self.filter_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("filter"))?
            .set_rule_params(slot, rule_index, n, x, o)
    }

    fn require_dest_mut(&mut self) -> ArchiveResult<&mut DestFileTable> {
        self.dest_table
            .as_mut()
            .ok_or(ArchiveError::TableNotLoaded("destination"))
    }

    pub fn set_dest_enabled(&mut self, dest: usize, enabled: bool) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_enabled(dest, enabled)
    }

    pub fn set_dest_name_type(&mut self, dest: usize, name_type: FileNameType) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_name_type(dest, name_type)
    }

    pub fn set_dest_max_size(&mut self, dest: usize, max_size: u64) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_max_size(dest, max_size)
    }

    pub fn set_dest_max_age(&mut self, dest: usize, max_age_secs: u32) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_max_age(dest, max_age_secs)
    }

    /// Set a destination's sequence count; the runtime counter and the
    /// persisted state follow the accepted value
    pub fn set_dest_seq_count(&mut self, dest: usize, seq_count: u32) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_seq_count(dest, seq_count)?;
        self.status[dest].seq = seq_count;
        self.state.seq_counts[dest] = seq_count;
        self.persist();
        Ok(())
    }

    pub fn set_dest_path(&mut self, dest: usize, path: &str) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_path(dest, path)
    }

    pub fn set_dest_base(&mut self, dest: usize, base: &str) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_base(dest, base)
    }

    pub fn set_dest_extension(&mut self, dest: usize, extension: &str) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_extension(dest, extension)
    }

    pub fn set_dest_move_path(&mut self, dest: usize, move_path: Option<&str>) -> ArchiveResult<()> {
        self.require_dest_mut()?.set_move_path(dest, move_path)
    }

    /// Per-destination status snapshots for telemetry reporting
    pub fn status_snapshot(&self) -> Vec<DestStatusSnapshot> {
        self.status
            .iter()
            .enumerate()
            .map(|(index, status)| DestStatusSnapshot {
                index,
                enabled: self
                    .dest_table
                    .as_ref()
                    .map(|table| table.entries[index].enabled)
                    .unwrap_or(false),
                open: status.is_open(),
                file_name: status.file_name.clone(),
                size: status.size,
                age_secs: status.age_secs,
                rate: status.rate,
                seq: status.seq,
            })
            .collect()
    }

    /// Running totals since startup
    pub fn counters(&self) -> ArchiveCounters {
        self.counters.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::dest::DestFileEntry;
    use crate::archive::filter::{FilterRule, PacketFilterEntry};
    use crate::archive::name::BoundedString;
    use chrono::TimeZone;
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn config_for(dir: &Path) -> AppConfig {
        AppConfig {
            port: 0,
            state_file: dir.join("state.json"),
            filter_table: None,
            dest_table: None,
            enable_default: true,
        }
    }

    fn count_rule(dest: u16, n: u16, x: u16, o: u16) -> FilterRule {
        FilterRule {
            dest_index: Some(dest),
            filter_type: FilterType::ByCount,
            n,
            x,
            o,
        }
    }

    fn filter_table_with(packet_id: u32, rule: FilterRule) -> FilterTable {
        let mut entry = PacketFilterEntry {
            packet_id,
            rules: Default::default(),
        };
        entry.rules[0] = rule;
        FilterTable {
            descriptor: "test filters".to_string(),
            entries: vec![entry],
        }
    }

    fn dest_table_for(dir: &Path, max_size: u64) -> DestFileTable {
        let entry = DestFileEntry {
            path: BoundedString::new(dir.to_str().unwrap()).unwrap(),
            base: BoundedString::new("tlm").unwrap(),
            extension: BoundedString::new("pkt").unwrap(),
            enabled: true,
            max_size,
            max_age_secs: 3600,
            ..Default::default()
        };
        DestFileTable {
            descriptor: "test destinations".to_string(),
            entries: vec![entry],
        }
    }

    fn packet(packet_id: u32, len: usize) -> ArchivePacket {
        ArchivePacket {
            packet_id,
            timestamp: Utc::now(),
            data: vec![0xA5; len],
        }
    }

    fn archive_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".pkt"))
            .collect();
        names.sort();
        names
    }

    fn engine_with_tables(dir: &TempDir, max_size: u64) -> ArchiveEngine {
        let mut engine = ArchiveEngine::new(&config_for(dir.path()));
        assert!(engine.load_dest_table(dest_table_for(dir.path(), max_size)).is_ok());
        assert!(engine
            .load_filter_table(filter_table_with(100, count_rule(0, 1, 1, 0)))
            .is_ok());
        engine
    }

    #[test]
    fn scenario_a_pass_every_instance_into_one_file() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        for i in 0..10 {
            let disposition = engine.process_packet(&packet(100, 100));
            assert_eq!(disposition, Disposition::Archived(1), "packet {}", i);
        }

        let snapshot = &engine.status_snapshot()[0];
        assert!(snapshot.open);
        assert_eq!(snapshot.size, 1000);
        assert_eq!(snapshot.seq, 0);
        assert_eq!(archive_files(dir.path()).len(), 1);

        let counters = engine.counters();
        assert_eq!(counters.accepted, 10);
        assert_eq!(counters.destination_writes, 10);
    }

    #[test]
    fn scenario_b_size_threshold_rotates_the_file() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 350);

        for _ in 0..4 {
            engine.process_packet(&packet(100, 100));
        }
        // Fourth packet pushed the size past 350: closed and sequence bumped
        let snapshot = &engine.status_snapshot()[0];
        assert!(!snapshot.open);
        assert_eq!(snapshot.seq, 1);

        for _ in 0..2 {
            assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Archived(1));
        }
        let snapshot = &engine.status_snapshot()[0];
        assert!(snapshot.open);
        assert!(snapshot.file_name.ends_with("tlm00000001.pkt"));
        assert_eq!(
            archive_files(dir.path()),
            vec!["tlm00000000.pkt".to_string(), "tlm00000001.pkt".to_string()]
        );
    }

    #[test]
    fn scenario_c_unknown_identifier_is_no_rule() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        assert_eq!(engine.process_packet(&packet(200, 64)), Disposition::NoRule);
        assert!(engine.status_snapshot().iter().all(|s| !s.open));
        assert_eq!(engine.counters().no_rule, 1);
        assert!(archive_files(dir.path()).is_empty());
    }

    #[test]
    fn scenario_d_disabled_destination_never_opens() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);
        engine.set_dest_enabled(0, false).unwrap();

        for _ in 0..5 {
            assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Disabled);
        }
        assert!(!engine.status_snapshot()[0].open);
        assert_eq!(engine.counters().disabled, 5);
        assert!(archive_files(dir.path()).is_empty());
    }

    #[test]
    fn app_disable_drops_packets_and_survives_restart() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        engine.set_app_enabled(false);
        assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Disabled);
        drop(engine);

        let restarted = ArchiveEngine::new(&config_for(dir.path()));
        assert!(!restarted.app_enabled());
    }

    #[test]
    fn sequence_counters_survive_restart() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 350);
        for _ in 0..4 {
            engine.process_packet(&packet(100, 100));
        }
        assert_eq!(engine.status_snapshot()[0].seq, 1);
        engine.shutdown();
        drop(engine);

        let mut restarted = ArchiveEngine::new(&config_for(dir.path()));
        assert_eq!(restarted.status_snapshot()[0].seq, 1);

        // A dest table reload with a smaller stored count must not rewind
        assert!(restarted.load_dest_table(dest_table_for(dir.path(), 350)).is_ok());
        assert_eq!(restarted.status_snapshot()[0].seq, 1);
    }

    #[test]
    fn explicit_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);
        engine.process_packet(&packet(100, 100));
        assert!(engine.status_snapshot()[0].open);

        engine.close_dest(0).unwrap();
        let after_first = engine.status_snapshot();
        assert!(!after_first[0].open);
        assert_eq!(after_first[0].seq, 1);

        engine.close_dest(0).unwrap();
        let after_second = engine.status_snapshot();
        assert_eq!(after_second[0].seq, 1);
        assert_eq!(after_second[0].file_name, after_first[0].file_name);

        assert!(engine.close_dest(DEST_COUNT).is_err());
    }

    #[test]
    fn filtered_instances_are_classified_filtered_out() {
        let dir = tempdir().unwrap();
        let mut engine = ArchiveEngine::new(&config_for(dir.path()));
        assert!(engine.load_dest_table(dest_table_for(dir.path(), 4096)).is_ok());
        assert!(engine
            .load_filter_table(filter_table_with(100, count_rule(0, 1, 3, 0)))
            .is_ok());

        // N=1, X=3, O=0: instances 0, 3, 6 pass
        let outcomes: Vec<Disposition> = (0..7)
            .map(|_| engine.process_packet(&packet(100, 100)))
            .collect();
        assert_eq!(outcomes[0], Disposition::Archived(1));
        assert_eq!(outcomes[1], Disposition::FilteredOut);
        assert_eq!(outcomes[2], Disposition::FilteredOut);
        assert_eq!(outcomes[3], Disposition::Archived(1));
        assert_eq!(outcomes[6], Disposition::Archived(1));
        assert_eq!(engine.counters().filtered, 4);
    }

    #[test]
    fn filter_table_reload_resets_instance_counters() {
        let dir = tempdir().unwrap();
        let mut engine = ArchiveEngine::new(&config_for(dir.path()));
        assert!(engine.load_dest_table(dest_table_for(dir.path(), 4096)).is_ok());
        let table = filter_table_with(100, count_rule(0, 1, 3, 0));
        assert!(engine.load_filter_table(table.clone()).is_ok());

        assert_eq!(engine.process_packet(&packet(100, 10)), Disposition::Archived(1));
        assert_eq!(engine.process_packet(&packet(100, 10)), Disposition::FilteredOut);

        // Reload puts the identifier back at instance zero
        assert!(engine.load_filter_table(table).is_ok());
        assert_eq!(engine.process_packet(&packet(100, 10)), Disposition::Archived(1));
    }

    #[test]
    fn rejected_filter_table_leaves_the_prior_table_authoritative() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        let bad = filter_table_with(300, count_rule(DEST_COUNT as u16, 1, 1, 0));
        let summary = engine.load_filter_table(bad);
        assert!(!summary.is_ok());

        // The previously loaded table still filters
        assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Archived(1));
        assert_eq!(engine.process_packet(&packet(300, 100)), Disposition::NoRule);
    }

    #[test]
    fn dest_table_reload_closes_open_files() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);
        engine.process_packet(&packet(100, 100));
        assert!(engine.status_snapshot()[0].open);

        assert!(engine.load_dest_table(dest_table_for(dir.path(), 4096)).is_ok());
        assert!(!engine.status_snapshot()[0].open);
    }

    #[test]
    fn time_based_rule_follows_the_packet_timestamp() {
        let dir = tempdir().unwrap();
        let mut engine = ArchiveEngine::new(&config_for(dir.path()));
        assert!(engine.load_dest_table(dest_table_for(dir.path(), 4096)).is_ok());
        let rule = FilterRule {
            dest_index: Some(0),
            filter_type: FilterType::ByTime,
            n: 1,
            x: 10,
            o: 0,
        };
        assert!(engine.load_filter_table(filter_table_with(100, rule)).is_ok());

        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let at = |secs: i64| ArchivePacket {
            packet_id: 100,
            timestamp: base + chrono::Duration::seconds(secs),
            data: vec![0; 16],
        };

        // Seconds 0 and 10 land on the 10-second boundary, 5 does not
        assert_eq!(engine.process_packet(&at(0)), Disposition::Archived(1));
        assert_eq!(engine.process_packet(&at(5)), Disposition::FilteredOut);
        assert_eq!(engine.process_packet(&at(10)), Disposition::Archived(1));
    }

    #[test]
    fn age_threshold_rotates_on_the_management_tick() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);
        engine.set_dest_max_age(0, 60).unwrap();
        engine.process_packet(&packet(100, 100));

        engine.management_tick(30);
        assert!(engine.status_snapshot()[0].open);
        assert_eq!(engine.status_snapshot()[0].age_secs, 30);

        engine.management_tick(30);
        let snapshot = &engine.status_snapshot()[0];
        assert!(!snapshot.open);
        assert_eq!(snapshot.seq, 1);
    }

    #[test]
    fn identifier_edits_resolve_through_the_hash_index() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        assert!(matches!(
            engine.add_identifier(0),
            Err(ArchiveError::ReservedIdentifier)
        ));
        assert!(matches!(
            engine.add_identifier(100),
            Err(ArchiveError::AlreadyPresent(100))
        ));
        assert!(matches!(
            engine.remove_identifier(999),
            Err(ArchiveError::NotFound(999))
        ));

        let slot = engine.add_identifier(400).unwrap();
        engine.set_rule_dest(400, 0, Some(0)).unwrap();
        engine.set_rule_params(400, 0, 1, 1, 0).unwrap();
        let _ = slot;
        assert_eq!(engine.process_packet(&packet(400, 50)), Disposition::Archived(1));

        engine.remove_identifier(400).unwrap();
        assert_eq!(engine.process_packet(&packet(400, 50)), Disposition::NoRule);
    }

    #[test]
    fn rule_edits_validate_only_the_changed_fields() {
        let dir = tempdir().unwrap();
        let mut engine = engine_with_tables(&dir, 4096);

        assert!(matches!(
            engine.set_rule_dest(100, 0, Some(DEST_COUNT as u16)),
            Err(ArchiveError::BadIndex { .. })
        ));
        assert!(matches!(
            engine.set_rule_params(100, 0, 3, 2, 0),
            Err(ArchiveError::BadValue(_))
        ));
        assert!(matches!(
            engine.set_rule_params(100, 9, 1, 2, 0),
            Err(ArchiveError::BadIndex { .. })
        ));

        // The original pass-everything rule is untouched by the rejections
        assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Archived(1));
    }

    #[test]
    fn packets_pass_to_multiple_destinations_independently() {
        let dir = tempdir().unwrap();
        let mut engine = ArchiveEngine::new(&config_for(dir.path()));

        let mut dest_table = dest_table_for(dir.path(), 4096);
        let mut second = dest_table.entries[0].clone();
        second.base = BoundedString::new("aux").unwrap();
        dest_table.entries.push(second);
        assert!(engine.load_dest_table(dest_table).is_ok());

        let mut table = filter_table_with(100, count_rule(0, 1, 1, 0));
        table.entries[0].rules[1] = count_rule(1, 1, 2, 0);
        assert!(engine.load_filter_table(table).is_ok());

        // Instance 0 passes both rules, instance 1 only the first
        assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Archived(2));
        assert_eq!(engine.process_packet(&packet(100, 100)), Disposition::Archived(1));
        assert_eq!(engine.counters().destination_writes, 3);
    }

    #[test]
    fn move_directory_receives_rotated_files() {
        let dir = tempdir().unwrap();
        let move_dir = dir.path().join("closed");
        fs::create_dir(&move_dir).unwrap();

        let mut engine = ArchiveEngine::new(&config_for(dir.path()));
        let mut table = dest_table_for(dir.path(), 350);
        table.entries[0].move_path =
            Some(BoundedString::new(move_dir.to_str().unwrap()).unwrap());
        assert!(engine.load_dest_table(table).is_ok());
        assert!(engine
            .load_filter_table(filter_table_with(100, count_rule(0, 1, 1, 0)))
            .is_ok());

        for _ in 0..4 {
            engine.process_packet(&packet(100, 100));
        }
        assert_eq!(archive_files(&move_dir).len(), 1);
        assert!(archive_files(dir.path()).is_empty());
    }
}
