//! Graph arena for the dense index.
//!
//! Nodes live in a slot-addressed arena: parallel vectors hold the
//! external id, layer assignment, tombstone flag, and per-layer neighbor
//! lists of each slot. Neighbor links are plain slot indices, so there
//! are no pointer cycles and reads during search need no ownership
//! gymnastics. Slots are append-only; deletion tombstones the slot and
//! leaves its arena bytes in place.

use std::collections::HashMap;

use crate::types::VectorId;

/// Slot-addressed graph structure.
#[derive(Debug, Default)]
pub(super) struct GraphStore {
    /// Slot → external vector id.
    pub ids: Vec<VectorId>,
    /// External vector id → slot.
    pub id_map: HashMap<VectorId, u32>,
    /// Slot → layer → neighbor slots.
    pub neighbors: Vec<Vec<Vec<u32>>>,
    /// Slot → assigned layer level.
    pub levels: Vec<u8>,
    /// Slot → tombstone flag.
    pub deleted: Vec<bool>,
    /// Entry slot for greedy descent, the highest-layered live node.
    pub entry_point: Option<u32>,
    /// Highest layer currently populated.
    pub top_layer: usize,
    /// Number of live (non-tombstoned) nodes.
    pub live_count: usize,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total slots ever allocated, including tombstones.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_deleted(&self, slot: u32) -> bool {
        self.deleted[slot as usize]
    }

    /// Allocates the next slot for `id` at `level`. The caller must have
    /// checked that `id` is not already present.
    pub fn alloc(&mut self, id: VectorId, level: usize) -> u32 {
        let slot = self.ids.len() as u32;
        self.ids.push(id);
        self.id_map.insert(id, slot);
        self.neighbors.push(vec![Vec::new(); level + 1]);
        self.levels.push(level as u8);
        self.deleted.push(false);
        self.live_count += 1;
        slot
    }

    /// Draws a geometrically distributed layer level.
    ///
    /// Mean layer count is controlled by the neighbor fan-out, capped to
    /// the configured maximum so the descent depth stays bounded.
    pub fn random_level(neighbors_count: usize, num_layers: u8) -> usize {
        let ml = 1.0 / (neighbors_count.max(2) as f64).ln();
        let r: f64 = rand::random::<f64>().max(f64::MIN_POSITIVE);
        let level = (-r.ln() * ml).floor() as usize;
        level.min(num_layers.saturating_sub(1) as usize)
    }

    /// Tombstones `slot` and returns its severed neighbor lists for
    /// repair. Also re-elects the entry point if the deleted node held it.
    pub fn tombstone(&mut self, slot: u32) -> Vec<Vec<u32>> {
        let idx = slot as usize;
        self.deleted[idx] = true;
        self.live_count -= 1;
        self.id_map.remove(&self.ids[idx]);
        let severed = std::mem::take(&mut self.neighbors[idx]);

        if self.entry_point == Some(slot) {
            self.reelect_entry_point();
        }
        severed
    }

    /// Picks the live node with the highest layer as the new entry point
    /// (lowest slot wins ties), or clears it if the graph is empty.
    fn reelect_entry_point(&mut self) {
        let mut best: Option<(u8, u32)> = None;
        for (idx, &level) in self.levels.iter().enumerate() {
            if self.deleted[idx] {
                continue;
            }
            match best {
                Some((best_level, _)) if level <= best_level => {}
                _ => best = Some((level, idx as u32)),
            }
        }
        match best {
            Some((level, slot)) => {
                self.top_layer = level as usize;
                self.entry_point = Some(slot);
            }
            None => {
                self.top_layer = 0;
                self.entry_point = None;
            }
        }
    }
}
