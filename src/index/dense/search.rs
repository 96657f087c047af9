//! Greedy best-first search over the layered graph.
//!
//! A bounded candidate frontier explores each layer; tombstoned nodes
//! are traversed for navigation but never surface in results. Ties are
//! broken by lower external id at every comparison point.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use ordered_float::OrderedFloat;

use crate::index::SearchHit;
use crate::types::VectorId;

use super::cache::VectorCache;
use super::DenseIndex;

/// A frontier/result entry ordered by (distance, external id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    dist: OrderedFloat<f32>,
    id: VectorId,
    slot: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl DenseIndex {
    /// Searches one layer, returning up to `ef` live nodes closest to the
    /// query, ascending by (distance, id).
    #[allow(clippy::too_many_arguments)]
    pub(super) fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
        visited: &mut HashSet<u32>,
        mut cache: Option<&mut VectorCache>,
        scratch: &mut Vec<f32>,
    ) -> Vec<(f32, u32)> {
        visited.clear();
        // Frontier is a min-heap (closest first); results a max-heap so
        // the worst kept node is one peek away.
        let mut frontier: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef + 1);

        for &ep in entry_points {
            if !visited.insert(ep) {
                continue;
            }
            let candidate = Candidate {
                dist: OrderedFloat(self.query_distance(query, ep, cache.as_deref_mut(), scratch)),
                id: self.graph.ids[ep as usize],
                slot: ep,
            };
            frontier.push(Reverse(candidate));
            if !self.graph.is_deleted(ep) {
                results.push(candidate);
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(Reverse(candidate)) = frontier.pop() {
            if results.len() >= ef {
                let worst = results.peek().expect("results non-empty");
                if candidate.dist > worst.dist {
                    break;
                }
            }

            let lists = &self.graph.neighbors[candidate.slot as usize];
            if layer >= lists.len() {
                continue;
            }
            for &neighbor in &lists[layer] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let next = Candidate {
                    dist: OrderedFloat(
                        self.query_distance(query, neighbor, cache.as_deref_mut(), scratch),
                    ),
                    id: self.graph.ids[neighbor as usize],
                    slot: neighbor,
                };
                let keep = match results.peek() {
                    Some(worst) if results.len() >= ef => next < *worst,
                    _ => true,
                };
                if keep {
                    frontier.push(Reverse(next));
                    if !self.graph.is_deleted(neighbor) {
                        results.push(next);
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        results
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.dist.0, c.slot))
            .collect()
    }

    /// Full multi-layer nearest-neighbor search.
    pub(super) fn knn_search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let Some(entry) = self.graph.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        // The dequantization cache is shared mutable state; only lock it
        // when it can actually serve this search, so reads over a raw
        // arena never contend.
        let mut cache_guard = self.lock_cache_if_enabled();
        let mut visited = HashSet::new();
        let mut scratch = Vec::new();

        // Greedy descent through the sparse upper layers.
        let mut current = entry;
        for layer in (1..=self.graph.top_layer).rev() {
            let nearest = self.search_layer(
                query,
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

        // Exhaustive connectivity layer with the full search breadth.
        let ef = self.config.params.ef_search.max(k);
        let found = self.search_layer(
            query,
            &[current],
            ef,
            0,
            &mut visited,
            cache_guard.as_deref_mut(),
            &mut scratch,
        );

        found
            .into_iter()
            .take(k)
            .map(|(dist, slot)| SearchHit {
                id: self.graph.ids[slot as usize],
                score: self.config.metric.score(dist),
            })
            .collect()
    }
}
