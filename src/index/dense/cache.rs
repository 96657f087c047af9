//! Bounded cache of dequantized vectors for hot graph neighborhoods.
//!
//! Search over a quantized arena decodes every visited node; repeated
//! traversals of the same region decode the same vectors over and over.
//! This cache keeps the decoded f32 form of recently visited nodes, with
//! least-recently-visited eviction once the configured capacity is hit.

use std::collections::{BTreeMap, HashMap};

/// Least-recently-visited cache keyed by graph slot.
///
/// Recency is tracked with a monotonic visit counter; the side `BTreeMap`
/// keeps counters ordered so eviction is the smallest key.
#[derive(Debug)]
pub(crate) struct VectorCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<u32, (u64, Vec<f32>)>,
    by_visit: BTreeMap<u64, u32>,
}

impl VectorCache {
    /// Creates a cache bounded to `capacity` entries. A capacity of 0
    /// disables caching entirely.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::new(),
            by_visit: BTreeMap::new(),
        }
    }

    /// Looks up a slot, refreshing its recency on hit.
    pub fn get(&mut self, slot: u32) -> Option<&[f32]> {
        let entry = self.entries.get_mut(&slot)?;
        self.by_visit.remove(&entry.0);
        self.clock += 1;
        entry.0 = self.clock;
        self.by_visit.insert(self.clock, slot);
        Some(&self.entries[&slot].1)
    }

    /// Inserts a decoded vector, evicting the least recently visited
    /// entry if the cache is full.
    pub fn insert(&mut self, slot: u32, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        if let Some((stamp, _)) = self.entries.remove(&slot) {
            self.by_visit.remove(&stamp);
        }
        while self.entries.len() >= self.capacity {
            let Some((&oldest, &victim)) = self.by_visit.iter().next() else {
                break;
            };
            self.by_visit.remove(&oldest);
            self.entries.remove(&victim);
        }
        self.clock += 1;
        self.entries.insert(slot, (self.clock, vector));
        self.by_visit.insert(self.clock, slot);
    }

    /// Drops a slot (on vector deletion).
    pub fn remove(&mut self, slot: u32) {
        if let Some((stamp, _)) = self.entries.remove(&slot) {
            self.by_visit.remove(&stamp);
        }
    }

    /// Number of cached entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
