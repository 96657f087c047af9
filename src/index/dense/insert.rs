//! Insertion, neighbor selection, and delete repair for the dense index.
//!
//! Insertion follows the classic layered construction: draw a geometric
//! level, greedily descend from the top layer, then connect the new node
//! per layer to neighbors chosen with the diversity heuristic. Neighbor
//! lists that exceed their cap are re-pruned with the same heuristic
//! rather than plain distance truncation, which preserves navigability.

use std::collections::HashSet;

use crate::types::VectorId;

use super::graph::GraphStore;
use super::DenseIndex;

impl DenseIndex {
    /// Core insertion; dimension and uniqueness already checked.
    pub(super) fn insert_vector(&mut self, id: VectorId, values: &[f32]) {
        let level = GraphStore::random_level(
            self.config.params.neighbors_count,
            self.config.params.num_layers,
        );

        // First node: becomes the entry point, no links to build.
        let Some(entry) = self.graph.entry_point else {
            let slot = self.graph.alloc(id, level);
            self.store.push(values);
            self.graph.entry_point = Some(slot);
            self.graph.top_layer = level;
            return;
        };

        let top = self.graph.top_layer;
        let mut visited = HashSet::new();
        let mut scratch = Vec::new();

        // Phase 1: greedy descent from the top layer to just above the
        // new node's level.
        let mut current = entry;
        {
            let mut cache_guard = self.lock_cache_if_enabled();
            for layer in (level + 1..=top).rev() {
                let nearest = self.search_layer(
                    values,
                    &[current],
                    1,
                    layer,
                    &mut visited,
                    cache_guard.as_deref_mut(),
                    &mut scratch,
                );
                if let Some(&(_, slot)) = nearest.first() {
                    current = slot;
                }
            }
        }

        // Phase 2: per-layer candidate search from the node's level down
        // to 0, collecting the new node's neighbor lists.
        let join_top = level.min(top);
        let mut node_neighbors: Vec<Vec<u32>> = vec![Vec::new(); level + 1];
        {
            let mut cache_guard = self.lock_cache_if_enabled();
            let mut entry_points = vec![current];
            for layer in (0..=join_top).rev() {
                let candidates = self.search_layer(
                    values,
                    &entry_points,
                    self.config.params.ef_construction,
                    layer,
                    &mut visited,
                    cache_guard.as_deref_mut(),
                    &mut scratch,
                );
                let selected = self.select_diverse(&candidates, self.max_neighbors(layer));
                node_neighbors[layer] = selected.iter().map(|&(_, slot)| slot).collect();

                entry_points.clear();
                entry_points.extend(candidates.iter().map(|&(_, slot)| slot));
                if entry_points.is_empty() {
                    entry_points.push(current);
                }
            }
        }

        let slot = self.graph.alloc(id, level);
        self.store.push(values);
        self.graph.neighbors[slot as usize] = node_neighbors;

        // Phase 3: backlinks, pruning any neighbor list that overflows.
        for layer in 0..=join_top {
            let cap = self.max_neighbors(layer);
            let links = self.graph.neighbors[slot as usize][layer].clone();
            for neighbor in links {
                let lists = &mut self.graph.neighbors[neighbor as usize];
                while lists.len() <= layer {
                    lists.push(Vec::new());
                }
                lists[layer].push(slot);
                if lists[layer].len() > cap {
                    self.prune_neighbor_list(neighbor, layer, cap);
                }
            }
        }

        if level > self.graph.top_layer {
            self.graph.top_layer = level;
            self.graph.entry_point = Some(slot);
        }
    }

    /// Re-prunes one over-capacity neighbor list with the diversity
    /// heuristic, measured from the list's owner.
    fn prune_neighbor_list(&mut self, owner: u32, layer: usize, cap: usize) {
        let current = self.graph.neighbors[owner as usize][layer].clone();
        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();
        let mut candidates: Vec<(f32, u32)> = current
            .iter()
            .map(|&slot| {
                (
                    self.stored_distance(owner, slot, &mut buf_a, &mut buf_b),
                    slot,
                )
            })
            .collect();
        sort_by_distance_then_id(&self.graph, &mut candidates);
        let pruned = self.select_diverse(&candidates, cap);
        self.graph.neighbors[owner as usize][layer] = pruned.iter().map(|&(_, s)| s).collect();
    }

    /// Diversity-aware neighbor selection: a candidate is kept only if it
    /// is at least as close to the base as to every already-selected
    /// neighbor, so near-duplicate clusters don't crowd out coverage of
    /// other directions. Remaining slots are filled with the closest
    /// unused candidates.
    ///
    /// `candidates` must be sorted ascending by (distance, id).
    pub(super) fn select_diverse(&self, candidates: &[(f32, u32)], m: usize) -> Vec<(f32, u32)> {
        let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m);
        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();

        for &(dist_to_base, slot) in candidates {
            if selected.len() >= m {
                break;
            }
            let diverse = selected.iter().all(|&(_, kept)| {
                dist_to_base <= self.stored_distance(slot, kept, &mut buf_a, &mut buf_b)
            });
            if diverse {
                selected.push((dist_to_base, slot));
            }
        }

        if selected.len() < m {
            let chosen: HashSet<u32> = selected.iter().map(|&(_, s)| s).collect();
            for &(dist, slot) in candidates {
                if selected.len() >= m {
                    break;
                }
                if !chosen.contains(&slot) {
                    selected.push((dist, slot));
                }
            }
        }
        selected
    }

    /// Patches the holes a deletion leaves behind: every former neighbor
    /// loses its link to the deleted slot and is offered the deleted
    /// node's other former neighbors as reconnection candidates, re-pruned
    /// to the layer cap. Graph repair, not a rebuild.
    pub(super) fn repair_after_delete(&mut self, slot: u32, severed: &[Vec<u32>]) {
        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();

        for (layer, former) in severed.iter().enumerate() {
            let cap = self.max_neighbors(layer);
            for &orphan in former {
                if self.graph.is_deleted(orphan) {
                    continue;
                }
                let lists = &mut self.graph.neighbors[orphan as usize];
                if layer >= lists.len() {
                    continue;
                }
                lists[layer].retain(|&n| n != slot);
                let current = lists[layer].clone();

                let present: HashSet<u32> = current.iter().copied().collect();
                let pool: Vec<u32> = former
                    .iter()
                    .copied()
                    .filter(|&c| {
                        c != orphan && c != slot && !present.contains(&c) && !self.graph.is_deleted(c)
                    })
                    .collect();
                if pool.is_empty() {
                    continue;
                }

                let mut candidates: Vec<(f32, u32)> = current
                    .iter()
                    .chain(pool.iter())
                    .map(|&c| {
                        (
                            self.stored_distance(orphan, c, &mut buf_a, &mut buf_b),
                            c,
                        )
                    })
                    .collect();
                sort_by_distance_then_id(&self.graph, &mut candidates);
                let repaired = self.select_diverse(&candidates, cap);
                self.graph.neighbors[orphan as usize][layer] =
                    repaired.iter().map(|&(_, s)| s).collect();
            }
        }
    }
}

/// Ascending by distance, ties by lower external id.
pub(super) fn sort_by_distance_then_id(graph: &GraphStore, candidates: &mut [(f32, u32)]) {
    candidates.sort_unstable_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then_with(|| graph.ids[a.1 as usize].cmp(&graph.ids[b.1 as usize]))
    });
}
