use std::collections::BTreeMap;

use super::BeaconMap;

/// Per-beacon count of recent unmatched cycles, bounded to `[0, max]`.
#[derive(Clone, Debug, PartialEq)]
pub struct MissCounters {
    counts: BTreeMap<String, u32>,
    max: u32,
}

impl MissCounters {
    /// Every beacon starts at zero, i.e. visible.
    pub fn new(beacons: &BeaconMap, max: u32) -> Self {
        Self {
            counts: beacons.ids().map(|id| (id.to_string(), 0)).collect(),
            max,
        }
    }

    /// Saturating increment. Returns the new count.
    pub fn record_miss(&mut self, id: &str) -> u32 {
        let max = self.max;
        let count = self.counts.entry(id.to_string()).or_insert(0);
        *count = (*count + 1).min(max);
        *count
    }

    /// Floor decrement. Returns the new count.
    pub fn record_hit(&mut self, id: &str) -> u32 {
        let count = self.counts.entry(id.to_string()).or_insert(0);
        *count = count.saturating_sub(1);
        *count
    }

    pub fn get(&self, id: &str) -> u32 {
        self.counts.get(id).copied().unwrap_or(0)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.get(id) == 0
    }

    pub fn visibility(&self) -> BTreeMap<String, bool> {
        self.counts
            .iter()
            .map(|(id, &count)| (id.clone(), count == 0))
            .collect()
    }

    pub fn visible_count(&self) -> usize {
        self.counts.values().filter(|&&c| c == 0).count()
    }

    pub fn reset(&mut self) {
        self.counts.values_mut().for_each(|c| *c = 0);
    }
}
