use serde::{Deserialize, Serialize};

use crate::archive::{FILTER_TABLE_ENTRIES, RULES_PER_ENTRY};
use crate::models::status::ValidationSummary;
use crate::utils::error::{ArchiveError, ArchiveResult};

/// Which value stream the N/X/O algorithm is applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    /// Per-identifier running instance counter
    ByCount,

    /// Whole seconds of the packet's embedded timestamp
    ByTime,
}

/// One filtering rule: pass N out of every X instances, phase offset O,
/// archived to a single destination file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Destination file index; `None` means the rule is not yet resolved
    /// to a destination and is skipped by the engine
    pub dest_index: Option<u16>,

    /// Count-based or time-based filtering
    pub filter_type: FilterType,

    /// Instances passed per cycle
    pub n: u16,

    /// Cycle length; zero means every instance passes
    pub x: u16,

    /// Cycle phase offset
    pub o: u16,
}

impl Default for FilterRule {
    fn default() -> Self {
        // Unconditional pass, destination unresolved
        Self {
            dest_index: None,
            filter_type: FilterType::ByCount,
            n: 0,
            x: 0,
            o: 0,
        }
    }
}

impl FilterRule {
    /// A rule with no resolved destination takes no part in filtering
    pub fn is_unused(&self) -> bool {
        self.dest_index.is_none()
    }

    /// Apply the N/X/O selection law to an instance counter or coarse
    /// timestamp value.
    ///
    /// X = 0 passes every instance; N = 0 passes none. The offset is
    /// folded modulo X before subtracting so values below O keep the
    /// same cycle phase as the rest of the sequence.
    pub fn passes(&self, value: u32) -> bool {
        if self.x == 0 {
            return true;
        }
        if self.n == 0 {
            return false;
        }
        let x = u32::from(self.x);
        let phase = (value % x + x - u32::from(self.o) % x) % x;
        phase < u32::from(self.n)
    }

    /// Validate N/X/O ordering and the destination reference
    fn validate(&self, dest_count: usize) -> Result<(), String> {
        if let Some(dest) = self.dest_index {
            if usize::from(dest) >= dest_count {
                return Err(format!(
                    "destination index {} out of range (max {})",
                    dest,
                    dest_count - 1
                ));
            }
        }
        if self.x > 0 {
            if self.n > self.x {
                return Err(format!("N ({}) exceeds X ({})", self.n, self.x));
            }
            if self.o >= self.x {
                return Err(format!("O ({}) not below X ({})", self.o, self.x));
            }
        }
        Ok(())
    }
}

/// Filter rules for one packet identifier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFilterEntry {
    /// Packet identifier; zero marks the slot unused
    pub packet_id: u32,

    /// Per-destination rules, evaluated independently
    pub rules: [FilterRule; RULES_PER_ENTRY],
}

impl PacketFilterEntry {
    pub fn is_unused(&self) -> bool {
        self.packet_id == 0
    }
}

/// Operator-loaded mapping from packet identifier to filter rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTable {
    /// Free-form table identification, carried but never interpreted
    pub descriptor: String,

    /// Fixed-size slot array; shorter load images are padded with unused slots
    pub entries: Vec<PacketFilterEntry>,
}

impl FilterTable {
    /// Validate a whole table image against the destination count.
    ///
    /// Every used entry must have in-range destination references and
    /// consistent N/X/O values, and no identifier may appear twice. A single
    /// bad entry rejects the table; the summary carries per-entry counts and
    /// the first error for operator visibility.
    pub fn validate(&self, dest_count: usize) -> ValidationSummary {
        let mut summary = ValidationSummary::default();

        if self.entries.len() > FILTER_TABLE_ENTRIES {
            summary.bad = self.entries.len();
            summary.first_error = Some(format!(
                "table has {} entries, maximum is {}",
                self.entries.len(),
                FILTER_TABLE_ENTRIES
            ));
            return summary;
        }

        for (slot, entry) in self.entries.iter().enumerate() {
            if entry.is_unused() {
                summary.unused += 1;
                continue;
            }

            let duplicate = self.entries[..slot]
                .iter()
                .any(|prior| prior.packet_id == entry.packet_id);
            let mut error = if duplicate {
                Some(format!("duplicate packet identifier {:#06x}", entry.packet_id))
            } else {
                None
            };

            if error.is_none() {
                for (rule_index, rule) in entry.rules.iter().enumerate() {
                    if let Err(reason) = rule.validate(dest_count) {
                        error = Some(format!("rule {}: {}", rule_index, reason));
                        break;
                    }
                }
            }

            match error {
                Some(reason) => {
                    summary.bad += 1;
                    if summary.first_error.is_none() {
                        summary.first_error = Some(format!("slot {}: {}", slot, reason));
                    }
                }
                None => summary.good += 1,
            }
        }

        summary
    }

    /// Pad a validated image out to the fixed slot count
    pub fn pad_to_capacity(&mut self) {
        self.entries.resize_with(FILTER_TABLE_ENTRIES, Default::default);
    }

    /// Claim the first unused slot for a new identifier.
    ///
    /// The caller is responsible for having checked, via the hash index,
    /// that the identifier is not already present.
    pub fn claim_slot(&mut self, packet_id: u32) -> ArchiveResult<usize> {
        if packet_id == 0 {
            return Err(ArchiveError::ReservedIdentifier);
        }
        match self.entries.iter().position(PacketFilterEntry::is_unused) {
            Some(slot) => {
                self.entries[slot] = PacketFilterEntry {
                    packet_id,
                    rules: Default::default(),
                };
                Ok(slot)
            }
            None => Err(ArchiveError::TableFull),
        }
    }

    /// Release a slot, returning it to the unused pool
    pub fn clear_slot(&mut self, slot: usize) {
        self.entries[slot] = PacketFilterEntry::default();
    }

    fn rule_mut(&mut self, slot: usize, rule_index: usize) -> ArchiveResult<&mut FilterRule> {
        if rule_index >= RULES_PER_ENTRY {
            return Err(ArchiveError::BadIndex {
                what: "rule",
                index: rule_index,
                max: RULES_PER_ENTRY - 1,
            });
        }
        Ok(&mut self.entries[slot].rules[rule_index])
    }

    /// Point a rule at a destination file, or clear it with `None`
    pub fn set_rule_dest(
        &mut self,
        slot: usize,
        rule_index: usize,
        dest_index: Option<u16>,
        dest_count: usize,
    ) -> ArchiveResult<()> {
        if let Some(dest) = dest_index {
            if usize::from(dest) >= dest_count {
                return Err(ArchiveError::BadIndex {
                    what: "destination",
                    index: usize::from(dest),
                    max: dest_count - 1,
                });
            }
        }
        self.rule_mut(slot, rule_index)?.dest_index = dest_index;
        Ok(())
    }

    /// Switch a rule between count-based and time-based filtering
    pub fn set_rule_type(
        &mut self,
        slot: usize,
        rule_index: usize,
        filter_type: FilterType,
    ) -> ArchiveResult<()> {
        self.rule_mut(slot, rule_index)?.filter_type = filter_type;
        Ok(())
    }

    /// Replace a rule's N/X/O parameters, validating only those fields
    pub fn set_rule_params(
        &mut self,
        slot: usize,
        rule_index: usize,
        n: u16,
        x: u16,
        o: u16,
    ) -> ArchiveResult<()> {
        if x > 0 {
            if n > x {
                return Err(ArchiveError::BadValue(format!(
                    "N ({}) exceeds X ({})",
                    n, x
                )));
            }
            if o >= x {
                return Err(ArchiveError::BadValue(format!(
                    "O ({}) not below X ({})",
                    o, x
                )));
            }
        }
        let rule = self.rule_mut(slot, rule_index)?;
        rule.n = n;
        rule.x = x;
        rule.o = o;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(n: u16, x: u16, o: u16) -> FilterRule {
        FilterRule {
            dest_index: Some(0),
            filter_type: FilterType::ByCount,
            n,
            x,
            o,
        }
    }

    fn table_with_entry(entry: PacketFilterEntry) -> FilterTable {
        FilterTable {
            descriptor: "test".to_string(),
            entries: vec![entry],
        }
    }

    #[test]
    fn x_zero_passes_everything() {
        let r = rule(0, 0, 0);
        for value in 0..100 {
            assert!(r.passes(value));
        }
    }

    #[test]
    fn n_zero_with_positive_x_passes_nothing() {
        let r = rule(0, 7, 3);
        for value in 0..100 {
            assert!(!r.passes(value));
        }
    }

    #[test]
    fn one_of_three_passes_instances_0_3_6() {
        let r = rule(1, 3, 0);
        let passed: Vec<u32> = (0..10).filter(|&v| r.passes(v)).collect();
        assert_eq!(passed, vec![0, 3, 6, 9]);
    }

    #[test]
    fn exactly_n_pass_in_any_window_of_x() {
        for (n, x, o) in [(1u16, 3u16, 0u16), (2, 5, 1), (3, 3, 2), (4, 7, 6)] {
            let r = rule(n, x, o);
            for start in [0u32, 1, 7, 100, 1000] {
                let hits = (start..start + u32::from(x)).filter(|&v| r.passes(v)).count();
                assert_eq!(
                    hits,
                    usize::from(n),
                    "window at {} for N={} X={} O={}",
                    start,
                    n,
                    x,
                    o
                );
            }
        }
    }

    #[test]
    fn values_below_offset_keep_the_cycle_phase() {
        // With X not a power of two a wrapping subtraction would shift
        // the phase for values below O; instance 0 must not pass here.
        let r = rule(2, 5, 1);
        let passed: Vec<u32> = (0..12).filter(|&v| r.passes(v)).collect();
        assert_eq!(passed, vec![1, 2, 6, 7, 11]);
    }

    #[test]
    fn offset_shifts_the_cycle_phase() {
        let r = rule(1, 4, 2);
        let passed: Vec<u32> = (0..12).filter(|&v| r.passes(v)).collect();
        assert_eq!(passed, vec![2, 6, 10]);
    }

    #[test]
    fn validate_rejects_out_of_range_destination() {
        let mut entry = PacketFilterEntry {
            packet_id: 100,
            rules: Default::default(),
        };
        entry.rules[0] = FilterRule {
            dest_index: Some(16),
            ..rule(1, 1, 0)
        };
        let summary = table_with_entry(entry).validate(16);
        assert_eq!(summary.bad, 1);
        assert_eq!(summary.good, 0);
        assert!(summary.first_error.unwrap().contains("destination index 16"));
    }

    #[test]
    fn validate_rejects_n_above_x() {
        let mut entry = PacketFilterEntry {
            packet_id: 100,
            rules: Default::default(),
        };
        entry.rules[0] = rule(4, 3, 0);
        let summary = table_with_entry(entry).validate(16);
        assert_eq!(summary.bad, 1);
    }

    #[test]
    fn validate_rejects_offset_at_or_above_x() {
        let mut entry = PacketFilterEntry {
            packet_id: 100,
            rules: Default::default(),
        };
        entry.rules[0] = rule(1, 3, 3);
        let summary = table_with_entry(entry).validate(16);
        assert_eq!(summary.bad, 1);
    }

    #[test]
    fn validate_rejects_duplicate_identifiers() {
        let entry = PacketFilterEntry {
            packet_id: 100,
            rules: Default::default(),
        };
        let table = FilterTable {
            descriptor: String::new(),
            entries: vec![entry.clone(), entry],
        };
        let summary = table.validate(16);
        assert_eq!(summary.bad, 1);
        assert!(summary.first_error.unwrap().contains("duplicate"));
    }

    #[test]
    fn validate_counts_unused_entries() {
        let mut table = FilterTable::default();
        table.entries = vec![PacketFilterEntry::default(); 5];
        table.entries[2].packet_id = 100;
        let summary = table.validate(16);
        assert_eq!(summary.unused, 4);
        assert_eq!(summary.good, 1);
        assert_eq!(summary.bad, 0);
    }

    #[test]
    fn claim_slot_rejects_identifier_zero() {
        let mut table = FilterTable::default();
        table.pad_to_capacity();
        assert!(matches!(
            table.claim_slot(0),
            Err(ArchiveError::ReservedIdentifier)
        ));
    }

    #[test]
    fn claim_slot_fails_when_full() {
        let mut table = FilterTable::default();
        table.pad_to_capacity();
        for (i, entry) in table.entries.iter_mut().enumerate() {
            entry.packet_id = (i + 1) as u32;
        }
        assert!(matches!(table.claim_slot(9999), Err(ArchiveError::TableFull)));
    }

    #[test]
    fn set_rule_params_rejects_bad_values_and_leaves_rule_unchanged() {
        let mut table = FilterTable::default();
        table.pad_to_capacity();
        let slot = table.claim_slot(100).unwrap();
        table.set_rule_params(slot, 0, 1, 4, 0).unwrap();

        assert!(table.set_rule_params(slot, 0, 5, 4, 0).is_err());
        assert!(table.set_rule_params(slot, 0, 1, 4, 4).is_err());

        let r = table.entries[slot].rules[0];
        assert_eq!((r.n, r.x, r.o), (1, 4, 0));
    }
}
