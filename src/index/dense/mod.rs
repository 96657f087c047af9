//! Graph-based dense index (layered navigable small-world graph).
//!
//! Approximate nearest-neighbor structure over fixed-dimension f32
//! vectors. Each vector is a node in a slot-addressed arena; layers above
//! 0 are sparser subgraphs that accelerate greedy descent toward the
//! query's neighborhood, and layer 0 holds every live node.
//!
//! Insertion connects a new node to its nearest neighbors per layer using
//! diversity-aware selection; deletion tombstones the node and repairs
//! the severed neighbor lists from the deleted node's former
//! neighborhood. Quantization (scalar or sample-frozen auto) compresses
//! stored components at insert time. All comparisons use the single
//! metric fixed at index creation.

mod cache;
mod distance;
mod graph;
mod insert;
mod quantization;
mod search;

pub use distance::DistanceMetric;
pub use quantization::{QuantizationMode, QuantizedKind};

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::index::SearchHit;
use crate::types::VectorId;

use cache::VectorCache;
use graph::GraphStore;
use quantization::{ScalarQuantizer, VectorStore};

/// Graph construction and search breadth parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Candidate frontier size during construction.
    pub ef_construction: usize,
    /// Candidate frontier size during search (higher = better recall).
    pub ef_search: usize,
    /// Maximum number of layers.
    pub num_layers: u8,
    /// Neighbor cap per node on layers above 0.
    pub neighbors_count: usize,
    /// Neighbor cap per node on layer 0 (typically double).
    pub level_0_neighbors_count: usize,
    /// Bound on the hot-neighborhood dequantization cache, in entries.
    pub cache_size: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            ef_construction: 128,
            ef_search: 64,
            num_layers: 8,
            neighbors_count: 16,
            level_0_neighbors_count: 32,
            cache_size: 4096,
        }
    }
}

/// Configuration for a dense index, fixed for the index's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseIndexConfig {
    /// Vector dimension; inserts with a different length are rejected.
    pub dimension: usize,
    /// Distance metric used throughout construction and search.
    pub metric: DistanceMetric,
    /// Graph tuning parameters.
    #[serde(default)]
    pub params: HnswParams,
    /// Quantization mode.
    pub quantization: QuantizationMode,
    /// Value range frozen by auto quantization, recorded once sampling
    /// completes so a rebuilt index reuses the same buckets.
    #[serde(default)]
    pub frozen_range: Option<(f32, f32)>,
}

impl DenseIndexConfig {
    /// Creates a config with default graph parameters and no
    /// quantization.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            params: HnswParams::default(),
            quantization: QuantizationMode::None,
            frozen_range: None,
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.dimension == 0 {
            return Err(SchemaError::invalid_field("dimension", "must be > 0"));
        }
        if self.params.num_layers == 0 {
            return Err(SchemaError::invalid_field("num_layers", "must be > 0"));
        }
        if self.params.neighbors_count == 0 || self.params.level_0_neighbors_count == 0 {
            return Err(SchemaError::invalid_field(
                "neighbors_count",
                "neighbor caps must be > 0",
            ));
        }
        if self.params.ef_construction == 0 || self.params.ef_search == 0 {
            return Err(SchemaError::invalid_field(
                "ef",
                "search breadth parameters must be > 0",
            ));
        }
        match self.quantization {
            QuantizationMode::None => {}
            QuantizationMode::Auto { sample_size } => {
                if sample_size == 0 {
                    return Err(SchemaError::invalid_field("sample_size", "must be > 0"));
                }
            }
            QuantizationMode::Scalar { range: (min, max), .. } => {
                if !(min < max) {
                    return Err(SchemaError::invalid_field(
                        "range",
                        "quantization range must satisfy min < max",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The dense index. Not internally synchronized; the owning collection
/// wraps it in its state lock (the dequantization cache has its own
/// interior lock so searches can share `&self`).
#[derive(Debug)]
pub struct DenseIndex {
    config: DenseIndexConfig,
    graph: GraphStore,
    store: VectorStore,
    cache: Mutex<VectorCache>,
    /// Vectors still to sample before auto quantization freezes.
    sampling_remaining: Option<usize>,
    /// Range frozen by the most recent insert, until collected for
    /// persistence.
    newly_frozen: Option<(f32, f32)>,
}

impl DenseIndex {
    /// Creates an empty index from a validated configuration.
    pub fn new(config: DenseIndexConfig) -> Result<Self, SchemaError> {
        config.validate()?;
        let (store, sampling_remaining) = match (config.quantization, config.frozen_range) {
            (QuantizationMode::None, _) => (VectorStore::Raw(Vec::new()), None),
            (QuantizationMode::Scalar { kind, range }, _) => (
                VectorStore::Quantized {
                    codes: Vec::new(),
                    quantizer: ScalarQuantizer::new(kind, range),
                },
                None,
            ),
            // A previously frozen auto range is reused verbatim.
            (QuantizationMode::Auto { .. }, Some(range)) => (
                VectorStore::Quantized {
                    codes: Vec::new(),
                    quantizer: ScalarQuantizer::new(QuantizedKind::U8, range),
                },
                None,
            ),
            (QuantizationMode::Auto { sample_size }, None) => {
                (VectorStore::Raw(Vec::new()), Some(sample_size))
            }
        };
        let cache_size = config.params.cache_size;
        Ok(Self {
            config,
            graph: GraphStore::new(),
            store,
            cache: Mutex::new(VectorCache::new(cache_size)),
            sampling_remaining,
            newly_frozen: None,
        })
    }

    /// Returns the index configuration.
    pub fn config(&self) -> &DenseIndexConfig {
        &self.config
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.graph.live_count
    }

    /// Returns true if the index holds no live vectors.
    pub fn is_empty(&self) -> bool {
        self.graph.live_count == 0
    }

    /// Returns true if `id` is present and not deleted.
    pub fn contains(&self, id: VectorId) -> bool {
        self.graph.id_map.contains_key(&id)
    }

    /// Inserts a vector. The caller guarantees id uniqueness (commit
    /// validation); the dimension is checked here.
    pub fn insert(&mut self, id: VectorId, values: &[f32]) -> Result<(), SchemaError> {
        if values.len() != self.config.dimension {
            return Err(SchemaError::dimension_mismatch(
                self.config.dimension,
                values.len(),
            ));
        }
        debug_assert!(
            !self.graph.id_map.contains_key(&id),
            "duplicate id reached the dense index"
        );
        self.insert_vector(id, values);

        // Auto quantization: freeze the observed range once the sample
        // threshold is reached and re-encode everything stored so far.
        if let Some(remaining) = self.sampling_remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                let range = self.store.freeze(self.config.dimension);
                self.config.frozen_range = Some(range);
                self.newly_frozen = Some(range);
                self.sampling_remaining = None;
                tracing::debug!(min = range.0, max = range.1, "auto quantization range frozen");
            }
        }
        Ok(())
    }

    /// Deletes a vector, repairing the neighbor lists it was part of.
    /// Returns false if the id is unknown.
    pub fn delete(&mut self, id: VectorId) -> bool {
        let Some(&slot) = self.graph.id_map.get(&id) else {
            return false;
        };
        self.cache.lock().expect("cache lock poisoned").remove(slot);
        let severed = self.graph.tombstone(slot);
        self.repair_after_delete(slot, &severed);
        true
    }

    /// Takes the range frozen by auto quantization since the last call,
    /// if any, so the owner can persist it.
    pub fn take_frozen_range(&mut self) -> Option<(f32, f32)> {
        self.newly_frozen.take()
    }

    /// Searches for the `top_k` nearest vectors, best first, ties broken
    /// by lower id. Scores follow the configured metric (higher is
    /// better).
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, SchemaError> {
        if query.len() != self.config.dimension {
            return Err(SchemaError::dimension_mismatch(
                self.config.dimension,
                query.len(),
            ));
        }
        Ok(self.knn_search(query, top_k))
    }

    /// Neighbor cap for a layer.
    #[inline]
    fn max_neighbors(&self, layer: usize) -> usize {
        if layer == 0 {
            self.config.params.level_0_neighbors_count
        } else {
            self.config.params.neighbors_count
        }
    }

    /// Returns true when searches should consult the dequantization
    /// cache (quantized arena with a nonzero cache bound).
    fn cache_enabled(&self) -> bool {
        self.store.is_quantized() && self.config.params.cache_size > 0
    }

    /// Locks the dequantization cache when it can serve lookups, so
    /// raw-arena traffic never touches the mutex.
    fn lock_cache_if_enabled(&self) -> Option<std::sync::MutexGuard<'_, VectorCache>> {
        if self.cache_enabled() {
            Some(self.cache.lock().expect("cache lock poisoned"))
        } else {
            None
        }
    }

    /// Distance from an external query to a stored node, consulting the
    /// dequantization cache for quantized arenas when one is supplied.
    fn query_distance(
        &self,
        query: &[f32],
        slot: u32,
        cache: Option<&mut VectorCache>,
        scratch: &mut Vec<f32>,
    ) -> f32 {
        let dim = self.config.dimension;
        if let Some(raw) = self.store.raw_slice(slot, dim) {
            return self.config.metric.distance(query, raw);
        }
        if let Some(cache) = cache {
            if let Some(cached) = cache.get(slot) {
                return self.config.metric.distance(query, cached);
            }
            scratch.resize(dim, 0.0);
            self.store.load_into(slot, dim, scratch);
            cache.insert(slot, scratch.clone());
            return self.config.metric.distance(query, scratch);
        }
        scratch.resize(dim, 0.0);
        self.store.load_into(slot, dim, scratch);
        self.config.metric.distance(query, scratch)
    }

    /// Distance between two stored nodes.
    fn stored_distance(&self, a: u32, b: u32, buf_a: &mut Vec<f32>, buf_b: &mut Vec<f32>) -> f32 {
        let dim = self.config.dimension;
        match (self.store.raw_slice(a, dim), self.store.raw_slice(b, dim)) {
            (Some(ra), Some(rb)) => self.config.metric.distance(ra, rb),
            _ => {
                buf_a.resize(dim, 0.0);
                buf_b.resize(dim, 0.0);
                self.store.load_into(a, dim, buf_a);
                self.store.load_into(b, dim, buf_b);
                self.config.metric.distance(buf_a, buf_b)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(dimension: usize) -> DenseIndexConfig {
        DenseIndexConfig {
            params: HnswParams {
                ef_construction: 32,
                ef_search: 32,
                num_layers: 4,
                neighbors_count: 8,
                level_0_neighbors_count: 16,
                cache_size: 64,
            },
            ..DenseIndexConfig::new(dimension, DistanceMetric::Cosine)
        }
    }

    fn make_vector(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f32 * 0.1 + i as f32 * 0.01).sin())
            .collect()
    }

    #[test]
    fn test_new_index_is_empty() {
        let index = DenseIndex::new(small_config(8)).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.search(&make_vector(1, 8), 5).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = small_config(0);
        assert!(DenseIndex::new(config.clone()).is_err());
        config.dimension = 4;
        config.quantization = QuantizationMode::Scalar {
            kind: QuantizedKind::U8,
            range: (1.0, 1.0),
        };
        assert!(DenseIndex::new(config).is_err());
    }

    #[test]
    fn test_insert_and_search_finds_exact_match() {
        let mut index = DenseIndex::new(small_config(8)).unwrap();
        for seed in 0..30u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 8))
                .unwrap();
        }
        assert_eq!(index.len(), 30);

        let hits = index.search(&make_vector(7, 8), 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, VectorId(7));
        // Best-first: scores are non-increasing.
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = DenseIndex::new(small_config(8)).unwrap();
        let err = index.insert(VectorId(1), &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SchemaError::DimensionMismatch { expected: 8, got: 2 }));
        assert!(index.is_empty());

        let err = index.search(&[1.0], 1).unwrap_err();
        assert!(matches!(err, SchemaError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_delete_excludes_from_search() {
        let mut index = DenseIndex::new(small_config(8)).unwrap();
        for seed in 0..20u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 8))
                .unwrap();
        }
        assert!(index.delete(VectorId(3)));
        assert!(!index.delete(VectorId(3)));
        assert_eq!(index.len(), 19);
        assert!(!index.contains(VectorId(3)));

        let hits = index.search(&make_vector(3, 8), 20).unwrap();
        assert!(hits.iter().all(|hit| hit.id != VectorId(3)));
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_graph_stays_navigable_after_heavy_deletion() {
        let mut index = DenseIndex::new(small_config(4)).unwrap();
        for seed in 0..60u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 4))
                .unwrap();
        }
        // Delete half, including whatever holds the entry point.
        for seed in (0..60u64).step_by(2) {
            assert!(index.delete(VectorId(seed)));
        }
        assert_eq!(index.len(), 30);

        let hits = index.search(&make_vector(31, 4), 10).unwrap();
        assert_eq!(hits.len(), 10);
        assert_eq!(hits[0].id, VectorId(31));
    }

    #[test]
    fn test_delete_everything_then_reinsert() {
        let mut index = DenseIndex::new(small_config(4)).unwrap();
        for seed in 0..10u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 4))
                .unwrap();
        }
        for seed in 0..10u64 {
            assert!(index.delete(VectorId(seed)));
        }
        assert!(index.is_empty());
        assert!(index.search(&make_vector(0, 4), 5).unwrap().is_empty());

        index.insert(VectorId(100), &make_vector(5, 4)).unwrap();
        let hits = index.search(&make_vector(5, 4), 1).unwrap();
        assert_eq!(hits[0].id, VectorId(100));
    }

    #[test]
    fn test_auto_quantization_freezes_after_sample() {
        let mut config = small_config(4);
        config.quantization = QuantizationMode::Auto { sample_size: 5 };
        let mut index = DenseIndex::new(config).unwrap();

        for seed in 0..4u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 4))
                .unwrap();
        }
        assert!(index.take_frozen_range().is_none());
        assert!(!index.store.is_quantized());

        index.insert(VectorId(4), &make_vector(4, 4)).unwrap();
        let range = index.take_frozen_range().expect("range should freeze");
        assert!(range.0 < range.1);
        assert!(index.store.is_quantized());
        assert!(index.take_frozen_range().is_none(), "taken only once");

        // Search still works against the re-encoded arena.
        let hits = index.search(&make_vector(2, 4), 1).unwrap();
        assert_eq!(hits[0].id, VectorId(2));
    }

    #[test]
    fn test_scalar_quantized_search_recall() {
        let mut config = small_config(8);
        config.quantization = QuantizationMode::Scalar {
            kind: QuantizedKind::U16,
            range: (-1.0, 1.0),
        };
        let mut index = DenseIndex::new(config).unwrap();
        for seed in 0..40u64 {
            index
                .insert(VectorId(seed), &make_vector(seed, 8))
                .unwrap();
        }
        let hits = index.search(&make_vector(11, 8), 1).unwrap();
        assert_eq!(hits[0].id, VectorId(11));
    }

    #[test]
    fn test_frozen_range_reused_on_rebuild() {
        let mut config = small_config(4);
        config.quantization = QuantizationMode::Auto { sample_size: 3 };
        config.frozen_range = Some((-2.0, 2.0));
        let index = DenseIndex::new(config).unwrap();
        // With a persisted range there is no sampling phase.
        assert!(index.store.is_quantized());
        assert!(index.sampling_remaining.is_none());
    }

    #[test]
    fn test_ties_broken_by_lower_id() {
        let mut index = DenseIndex::new(small_config(4)).unwrap();
        let v = make_vector(1, 4);
        // Insert duplicated payloads under different ids, highest first.
        for id in [9u64, 5, 7] {
            index.insert(VectorId(id), &v).unwrap();
        }
        let hits = index.search(&v, 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.id.0).collect();
        assert_eq!(ids, vec![5, 7, 9]);
    }
}
