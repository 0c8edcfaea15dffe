//! Reassembly accumulators for logical entities that span several packets.
//!
//! Three families exist on the wire: alert tables (each alert names its
//! index and the table size), sweep-definition sets (one definition per
//! packet, set size learned from the max-sweep-index response) and
//! sweep-section sets (up to three sections per packet, set size named in
//! each section). An accumulator is complete only when every segment is
//! present; duplicate segment indices replace the previous copy rather than
//! duplicating it.

use crate::data::{AlertData, AlertTable, SweepDefinition, SweepSection};

/// Assembles the V1's alert table from individual alert-data packets.
///
/// A standing accumulator: after emitting one table it starts collecting
/// the next.
#[derive(Debug, Default)]
pub struct AlertTableAssembler {
    alerts: Vec<AlertData>,
}

impl AlertTableAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one alert. Returns the full table once every index is present.
    ///
    /// A count of zero is the V1 reporting silence: pending state is
    /// discarded and an empty table is emitted.
    pub fn add(&mut self, alert: AlertData) -> Option<AlertTable> {
        let count = alert.count();
        if count == 0 {
            self.alerts.clear();
            return Some(Vec::new());
        }

        // An alert with a repeated index supersedes the stale copy from the
        // previous table generation.
        self.alerts.retain(|a| a.index() != alert.index());
        self.alerts.push(alert);

        if self.alerts.len() < count as usize {
            return None;
        }

        // Assemble in index order; indices are one-based. Missing or
        // mismatched entries mean we straddle two table generations — keep
        // collecting.
        let mut table = Vec::with_capacity(count as usize);
        for index in 1..=count {
            match self
                .alerts
                .iter()
                .find(|a| a.index() == index && a.count() == count)
            {
                Some(alert) => table.push(*alert),
                None => {
                    tracing::debug!(index, count, "alert table incomplete, waiting");
                    return None;
                }
            }
        }
        self.alerts.clear();
        Some(table)
    }

    /// Discard partial state (connection teardown).
    pub fn clear(&mut self) {
        self.alerts.clear();
    }
}

/// Assembles a fixed-size set of sweep definitions, one per packet.
#[derive(Debug)]
pub struct SweepSetAssembler {
    slots: Vec<Option<SweepDefinition>>,
}

impl SweepSetAssembler {
    /// `count` is the number of definitions expected (max sweep index + 1).
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![None; count],
        }
    }

    /// Add one definition. Returns the ordered set once every slot is
    /// filled. Out-of-range indices are ignored.
    pub fn add(&mut self, definition: SweepDefinition) -> Option<Vec<SweepDefinition>> {
        let index = definition.index as usize;
        if index >= self.slots.len() {
            tracing::warn!(index, len = self.slots.len(), "sweep index out of range");
            return None;
        }
        self.slots[index] = Some(definition);

        if self.slots.iter().all(Option::is_some) {
            Some(self.slots.iter().map(|s| s.unwrap()).collect())
        } else {
            None
        }
    }
}

/// Assembles the full sweep-section list across one or more packets.
#[derive(Debug, Default)]
pub struct SectionSetAssembler {
    sections: Vec<SweepSection>,
}

impl SectionSetAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the sections of one packet. Returns the ordered list once the
    /// count every section names is reached.
    pub fn add(&mut self, batch: Vec<SweepSection>) -> Option<Vec<SweepSection>> {
        for section in batch {
            self.sections.retain(|s| s.index != section.index);
            self.sections.push(section);
        }

        let expected = self.sections.iter().map(|s| s.count).max()? as usize;
        if expected == 0 || self.sections.len() < expected {
            return None;
        }
        let mut sections = std::mem::take(&mut self.sections);
        sections.sort_by_key(|s| s.index);
        Some(sections)
    }
}
