//! Inverted sparse index.
//!
//! Maintains, per dimension, a posting list of (vector id, quantized
//! value) sorted by value descending. Search merges the posting lists of
//! the query's nonzero dimensions with dot-product accumulation; an
//! optional early-termination threshold stops merging once the maximum
//! possible remaining contribution can no longer disturb the top-k set,
//! trading exactness for speed on skewed distributions.
//!
//! Stored values are bucketed to the configured bit-width over the
//! `[0, 1]` range (out-of-range values clamp); query values keep full
//! precision.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::index::SearchHit;
use crate::types::{SparseEntry, VectorId};

/// Posting-value bucket count, fixed at index creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SparseQuantization {
    /// 16 value buckets.
    B16,
    /// 32 value buckets.
    B32,
    /// 64 value buckets.
    #[default]
    B64,
    /// 128 value buckets.
    B128,
}

impl SparseQuantization {
    /// Number of value buckets.
    #[inline]
    pub const fn levels(&self) -> u16 {
        match self {
            Self::B16 => 16,
            Self::B32 => 32,
            Self::B64 => 64,
            Self::B128 => 128,
        }
    }
}

/// Configuration for a sparse index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SparseIndexConfig {
    /// Value precision bucketing for posting-list compression.
    pub quantization: SparseQuantization,
}

/// One posting: vector id plus the bucketed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Posting {
    id: VectorId,
    code: u16,
}

/// The inverted sparse index.
#[derive(Debug)]
pub struct SparseIndex {
    config: SparseIndexConfig,
    /// Dimension index → postings sorted by (code desc, id asc).
    postings: HashMap<u32, Vec<Posting>>,
    /// Stored entries per vector, for deletion.
    entries: HashMap<VectorId, Vec<SparseEntry>>,
}

impl SparseIndex {
    /// Creates an empty index.
    pub fn new(config: SparseIndexConfig) -> Self {
        Self {
            config,
            postings: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    /// Returns the index configuration.
    pub fn config(&self) -> &SparseIndexConfig {
        &self.config
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no vectors are indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `id` is indexed.
    pub fn contains(&self, id: VectorId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Buckets a stored value. Values clamp to `[0, 1]`.
    #[inline]
    fn quantize(&self, value: f32) -> u16 {
        let max_code = (self.config.quantization.levels() - 1) as f32;
        (value.clamp(0.0, 1.0) * max_code).round() as u16
    }

    /// Reconstructs the bucket midpoint value.
    #[inline]
    fn dequantize(&self, code: u16) -> f32 {
        code as f32 / (self.config.quantization.levels() - 1) as f32
    }

    /// Indexes a sparse vector. The caller guarantees id uniqueness;
    /// dimension indices must be unique within the vector.
    pub fn insert(&mut self, id: VectorId, sparse: &[SparseEntry]) -> Result<(), SchemaError> {
        validate_unique_dimensions(sparse)?;
        debug_assert!(
            !self.entries.contains_key(&id),
            "duplicate id reached the sparse index"
        );

        for entry in sparse {
            let code = self.quantize(entry.value());
            let posting = Posting { id, code };
            let list = self.postings.entry(entry.dimension()).or_default();
            // Keep (code desc, id asc) order so the head is always the
            // maximum possible contribution.
            let at = list
                .binary_search_by(|p| {
                    Reverse(p.code)
                        .cmp(&Reverse(code))
                        .then_with(|| p.id.cmp(&id))
                })
                .unwrap_or_else(|i| i);
            list.insert(at, posting);
        }
        self.entries.insert(id, sparse.to_vec());
        Ok(())
    }

    /// Removes a vector from every posting list it appears in. Returns
    /// false if the id is unknown.
    pub fn delete(&mut self, id: VectorId) -> bool {
        let Some(stored) = self.entries.remove(&id) else {
            return false;
        };
        for entry in stored {
            if let Some(list) = self.postings.get_mut(&entry.dimension()) {
                list.retain(|p| p.id != id);
                if list.is_empty() {
                    self.postings.remove(&entry.dimension());
                }
            }
        }
        true
    }

    /// Top-k search by dot product over the query's nonzero dimensions.
    ///
    /// `early_termination` of `None` (or 0.0) is exact. With a threshold
    /// `t`, merging stops once the total remaining upper bound is at most
    /// `t` times the current k-th best score; any candidate excluded that
    /// way has a true score below `(1 + t)` times the reported k-th score.
    pub fn search(
        &self,
        query: &[SparseEntry],
        top_k: usize,
        early_termination: Option<f32>,
    ) -> Result<Vec<SearchHit>, SchemaError> {
        validate_unique_dimensions(query)?;
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        // Order lists by their maximum possible contribution so the
        // biggest score mass lands first; only positive-weight lists can
        // raise a score, so only they count toward the remaining bound.
        let mut lists: Vec<(f32, f32, &Vec<Posting>)> = Vec::new();
        for entry in query {
            if entry.value() == 0.0 {
                continue;
            }
            if let Some(list) = self.postings.get(&entry.dimension()) {
                let head = self.dequantize(list[0].code);
                let bound = (entry.value() * head).max(0.0);
                lists.push((bound, entry.value(), list));
            }
        }
        lists.sort_unstable_by(|a, b| b.0.total_cmp(&a.0));

        let threshold = early_termination.unwrap_or(0.0).max(0.0);
        let mut remaining: f32 = lists.iter().map(|(bound, _, _)| bound).sum();
        let mut scores: HashMap<VectorId, f32> = HashMap::new();

        for (bound, weight, list) in lists {
            for posting in list {
                *scores.entry(posting.id).or_insert(0.0) += weight * self.dequantize(posting.code);
            }
            remaining -= bound;

            if scores.len() >= top_k {
                let kth = kth_best_score(&scores, top_k);
                if kth > 0.0 && remaining <= threshold * kth {
                    break;
                }
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(id, score)| SearchHit { id, score })
            .collect();
        hits.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Current k-th best accumulated score.
fn kth_best_score(scores: &HashMap<VectorId, f32>, k: usize) -> f32 {
    let mut heap: BinaryHeap<Reverse<OrderedFloat<f32>>> = BinaryHeap::with_capacity(k + 1);
    for &score in scores.values() {
        heap.push(Reverse(OrderedFloat(score)));
        if heap.len() > k {
            heap.pop();
        }
    }
    heap.peek().map(|Reverse(s)| s.0).unwrap_or(0.0)
}

fn validate_unique_dimensions(entries: &[SparseEntry]) -> Result<(), SchemaError> {
    let mut seen = std::collections::HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.dimension()) {
            return Err(SchemaError::DuplicateSparseDimension {
                index: entry.dimension(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dim: u32, value: f32) -> SparseEntry {
        SparseEntry(dim, value)
    }

    fn seeded() -> SparseIndex {
        let mut index = SparseIndex::new(SparseIndexConfig {
            quantization: SparseQuantization::B128,
        });
        index
            .insert(VectorId(1), &[entry(0, 0.9), entry(2, 0.5)])
            .unwrap();
        index
            .insert(VectorId(2), &[entry(0, 0.1), entry(1, 0.8)])
            .unwrap();
        index
            .insert(VectorId(3), &[entry(2, 1.0), entry(3, 0.4)])
            .unwrap();
        index
    }

    #[test]
    fn test_insert_and_exact_search() {
        let index = seeded();
        let hits = index
            .search(&[entry(0, 1.0), entry(2, 1.0)], 3, None)
            .unwrap();
        assert_eq!(hits.len(), 3);
        // Vector 1 overlaps both query dims: 0.9 + 0.5.
        assert_eq!(hits[0].id, VectorId(1));
        assert!((hits[0].score - 1.4).abs() < 0.02);
        // Vector 3 contributes only on dim 2.
        assert_eq!(hits[1].id, VectorId(3));
    }

    #[test]
    fn test_search_ignores_unknown_dimensions() {
        let index = seeded();
        let hits = index.search(&[entry(99, 1.0)], 5, None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_delete_removes_from_postings() {
        let mut index = seeded();
        assert!(index.delete(VectorId(1)));
        assert!(!index.delete(VectorId(1)));
        assert!(!index.contains(VectorId(1)));
        assert_eq!(index.len(), 2);

        let hits = index.search(&[entry(0, 1.0)], 5, None).unwrap();
        assert!(hits.iter().all(|h| h.id != VectorId(1)));
        assert_eq!(hits[0].id, VectorId(2));
    }

    #[test]
    fn test_duplicate_dimension_rejected() {
        let mut index = seeded();
        let err = index
            .insert(VectorId(9), &[entry(1, 0.5), entry(1, 0.7)])
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::DuplicateSparseDimension { index: 1 }
        ));
        assert!(!index.contains(VectorId(9)));

        let err = index
            .search(&[entry(0, 1.0), entry(0, 0.5)], 3, None)
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateSparseDimension { .. }));
    }

    #[test]
    fn test_posting_lists_sorted_by_value_descending() {
        let mut index = SparseIndex::new(SparseIndexConfig::default());
        index.insert(VectorId(1), &[entry(0, 0.2)]).unwrap();
        index.insert(VectorId(2), &[entry(0, 0.9)]).unwrap();
        index.insert(VectorId(3), &[entry(0, 0.5)]).unwrap();
        let list = index.postings.get(&0).unwrap();
        let codes: Vec<u16> = list.iter().map(|p| p.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(codes, sorted);
        assert_eq!(list[0].id, VectorId(2));
    }

    #[test]
    fn test_ties_broken_by_lower_id() {
        let mut index = SparseIndex::new(SparseIndexConfig::default());
        index.insert(VectorId(8), &[entry(0, 0.5)]).unwrap();
        index.insert(VectorId(2), &[entry(0, 0.5)]).unwrap();
        let hits = index.search(&[entry(0, 1.0)], 2, None).unwrap();
        assert_eq!(hits[0].id, VectorId(2));
        assert_eq!(hits[1].id, VectorId(8));
    }

    #[test]
    fn test_early_termination_zero_threshold_is_exact() {
        let index = seeded();
        let exact = index
            .search(&[entry(0, 1.0), entry(1, 0.3), entry(2, 0.6)], 3, None)
            .unwrap();
        let zero = index
            .search(&[entry(0, 1.0), entry(1, 0.3), entry(2, 0.6)], 3, Some(0.0))
            .unwrap();
        assert_eq!(exact.len(), zero.len());
        for (a, b) in exact.iter().zip(&zero) {
            assert_eq!(a.id, b.id);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_early_termination_keeps_top_result_on_skew() {
        // One dominant dimension and a long tail of weak ones.
        let mut index = SparseIndex::new(SparseIndexConfig {
            quantization: SparseQuantization::B128,
        });
        index.insert(VectorId(1), &[entry(0, 1.0)]).unwrap();
        for id in 2..20u64 {
            index
                .insert(VectorId(id), &[entry(id as u32, 0.05)])
                .unwrap();
        }
        let query: Vec<SparseEntry> =
            std::iter::once(entry(0, 1.0)).chain((2..20).map(|d| entry(d, 0.05))).collect();
        let hits = index.search(&query, 1, Some(0.5)).unwrap();
        assert_eq!(hits[0].id, VectorId(1));
    }

    #[test]
    fn test_quantization_bucketing_precision() {
        let coarse = SparseIndex::new(SparseIndexConfig {
            quantization: SparseQuantization::B16,
        });
        let fine = SparseIndex::new(SparseIndexConfig {
            quantization: SparseQuantization::B128,
        });
        let value = 0.43f32;
        let coarse_err = (coarse.dequantize(coarse.quantize(value)) - value).abs();
        let fine_err = (fine.dequantize(fine.quantize(value)) - value).abs();
        assert!(fine_err < coarse_err);
        // Out-of-range values clamp.
        assert_eq!(coarse.quantize(7.0), 15);
        assert_eq!(coarse.quantize(-3.0), 0);
    }
}
