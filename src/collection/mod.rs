//! Collection registry types and per-collection runtime state.
//!
//! A **collection** is an isolated namespace for vectors. Its descriptor
//! ([`CollectionRecord`]) carries the immutable name, capacity and
//! replication configuration, an optional metadata schema, and the
//! configs of the indexes attached to it (at most one dense, one sparse,
//! one TF-IDF). Descriptors persist through the storage engine; the
//! in-memory [`CollectionState`] pairs a descriptor with the live index
//! structures and the committed vector set.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};
use crate::index::dense::{DenseIndex, DenseIndexConfig};
use crate::index::sparse::{SparseIndex, SparseIndexConfig};
use crate::index::tfidf::{TfIdfIndex, TfIdfIndexConfig};
use crate::transaction::{ResolvedOp, TransactionTable};
use crate::types::{CollectionId, Timestamp, VectorId, VectorRecord};

/// Capacity and replication configuration for a collection.
///
/// The replication factor is advisory; this engine is single-instance
/// and records it for upstream deployment tooling without enforcing it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Optional maximum number of committed vectors.
    pub max_vector_count: Option<u64>,
    /// Optional advisory replication factor.
    pub replication_factor: Option<u32>,
}

/// Declared type of one metadata field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Boolean,
}

/// One typed metadata field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataField {
    /// Field name, unique within the schema.
    pub name: String,
    /// Declared type.
    pub kind: FieldKind,
}

/// Metadata schema: typed field declarations plus filter-support flags.
///
/// Consumed by query-time filtering, which sits outside the index
/// mechanics; the engine validates and carries the schema as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSchema {
    /// Declared fields.
    pub fields: Vec<MetadataField>,
    /// Whether AND filter combinations are supported.
    pub supports_and: bool,
    /// Whether OR filter combinations are supported.
    pub supports_or: bool,
}

impl MetadataSchema {
    /// Validates field declarations: non-empty, unique names.
    pub fn validate(&self) -> std::result::Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::invalid_field(
                    "metadata_schema",
                    "field names must not be empty",
                ));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::invalid_field(
                    "metadata_schema",
                    format!("duplicate field name '{}'", field.name),
                ));
            }
        }
        Ok(())
    }
}

/// Creation request for a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name, unique and immutable after creation.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Capacity and replication configuration.
    pub config: CollectionConfig,
    /// Optional metadata schema.
    pub metadata_schema: Option<MetadataSchema>,
}

impl CollectionSpec {
    /// Creates a spec with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Validates the spec.
    pub fn validate(&self) -> std::result::Result<(), SchemaError> {
        if self.name.trim().is_empty() {
            return Err(SchemaError::invalid_field("name", "must not be empty"));
        }
        if let Some(schema) = &self.metadata_schema {
            schema.validate()?;
        }
        Ok(())
    }
}

/// Persisted collection descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    /// Collection id.
    pub id: CollectionId,
    /// Collection name, unique and immutable.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Capacity and replication configuration.
    pub config: CollectionConfig,
    /// Optional metadata schema.
    pub metadata_schema: Option<MetadataSchema>,
    /// When the collection was created.
    pub created_at: Timestamp,
    /// Attached dense index config, if any.
    #[serde(default)]
    pub dense_index: Option<DenseIndexConfig>,
    /// Attached sparse index config, if any.
    #[serde(default)]
    pub sparse_index: Option<SparseIndexConfig>,
    /// Attached TF-IDF index config, if any.
    #[serde(default)]
    pub tfidf_index: Option<TfIdfIndexConfig>,
}

impl CollectionRecord {
    /// Builds the descriptor for a fresh collection.
    pub fn from_spec(id: CollectionId, spec: CollectionSpec) -> Self {
        Self {
            id,
            name: spec.name,
            description: spec.description,
            config: spec.config,
            metadata_schema: spec.metadata_schema,
            created_at: Timestamp::now(),
            dense_index: None,
            sparse_index: None,
            tfidf_index: None,
        }
    }
}

/// Live state of one collection: descriptor, committed vectors, and
/// index structures.
#[derive(Debug)]
pub(crate) struct CollectionState {
    pub record: CollectionRecord,
    pub vectors: BTreeMap<VectorId, VectorRecord>,
    pub dense: Option<DenseIndex>,
    pub sparse: Option<SparseIndex>,
    pub tfidf: Option<TfIdfIndex>,
}

impl CollectionState {
    /// Builds live state from a descriptor, instantiating any attached
    /// indexes empty.
    pub fn from_record(record: CollectionRecord) -> Result<Self> {
        let dense = record
            .dense_index
            .clone()
            .map(DenseIndex::new)
            .transpose()?;
        let sparse = record.sparse_index.map(SparseIndex::new);
        let tfidf = record.tfidf_index.map(TfIdfIndex::new);
        Ok(Self {
            record,
            vectors: BTreeMap::new(),
            dense,
            sparse,
            tfidf,
        })
    }

    /// Number of committed vectors.
    pub fn vector_count(&self) -> u64 {
        self.vectors.len() as u64
    }

    /// Validates a vector's shape against the collection configuration:
    /// at least one component, every present component backed by an
    /// enabled index, dense length matching the index dimension, sparse
    /// dimension indices unique.
    pub fn validate_record(&self, record: &VectorRecord) -> std::result::Result<(), SchemaError> {
        if record.is_empty() {
            return Err(SchemaError::EmptyVector { id: record.id });
        }
        if let Some(dense) = &record.dense {
            let Some(config) = &self.record.dense_index else {
                return Err(SchemaError::IndexNotEnabled { kind: "dense" });
            };
            if dense.len() != config.dimension {
                return Err(SchemaError::dimension_mismatch(config.dimension, dense.len()));
            }
        }
        if let Some(sparse) = &record.sparse {
            if self.record.sparse_index.is_none() {
                return Err(SchemaError::IndexNotEnabled { kind: "sparse" });
            }
            let mut seen = HashSet::with_capacity(sparse.len());
            for entry in sparse {
                if !seen.insert(entry.dimension()) {
                    return Err(SchemaError::DuplicateSparseDimension {
                        index: entry.dimension(),
                    });
                }
            }
        }
        if record.text.is_some() && self.record.tfidf_index.is_none() {
            return Err(SchemaError::IndexNotEnabled { kind: "tf-idf" });
        }
        Ok(())
    }

    /// Applies resolved, validated operations to the committed vector set
    /// and every attached index. Infallible by construction: all inputs
    /// were validated before the commit point.
    pub fn apply_resolved(&mut self, ops: &[ResolvedOp]) {
        for op in ops {
            match op {
                ResolvedOp::Put { record, .. } => {
                    if self.vectors.remove(&record.id).is_some() {
                        self.unindex(record.id);
                    }
                    self.index_record(record.clone());
                }
                ResolvedOp::Remove { id, .. } => {
                    if self.vectors.remove(id).is_some() {
                        self.unindex(*id);
                    }
                }
            }
        }
    }

    /// Re-inserts a committed vector loaded from storage (open path).
    pub fn restore(&mut self, record: VectorRecord) {
        self.index_record(record);
    }

    fn index_record(&mut self, mut record: VectorRecord) {
        if let (Some(index), Some(values)) = (self.dense.as_mut(), record.dense.as_deref()) {
            index
                .insert(record.id, values)
                .expect("dense shape validated before commit");
        }
        if let (Some(index), Some(entries)) = (self.sparse.as_mut(), record.sparse.as_deref()) {
            index
                .insert(record.id, entries)
                .expect("sparse shape validated before commit");
        }
        if let (Some(index), Some(text)) = (self.tfidf.as_mut(), record.text.as_deref()) {
            index.insert(record.id, text);
            if !index.config().store_raw_text {
                record.text = None;
            }
        }
        self.vectors.insert(record.id, record);
    }

    /// Removes `id` from every attached index (no-ops where absent).
    fn unindex(&mut self, id: VectorId) {
        if let Some(index) = self.dense.as_mut() {
            index.delete(id);
        }
        if let Some(index) = self.sparse.as_mut() {
            index.delete(id);
        }
        if let Some(index) = self.tfidf.as_mut() {
            index.delete(id);
        }
    }
}

/// Runtime handle for one collection.
///
/// The commit turnstile serializes commits (and index attachment) per
/// collection; the state lock's write side is the single commit point
/// that readers synchronize against. Active transaction buffers live in
/// the transaction table and never touch the state lock.
#[derive(Debug)]
pub(crate) struct CollectionHandle {
    pub id: CollectionId,
    pub name: String,
    pub state: RwLock<CollectionState>,
    pub commit_turnstile: Mutex<()>,
    pub transactions: Mutex<TransactionTable>,
}

impl CollectionHandle {
    pub fn new(state: CollectionState) -> Self {
        Self {
            id: state.record.id,
            name: state.record.name.clone(),
            state: RwLock::new(state),
            commit_turnstile: Mutex::new(()),
            transactions: Mutex::new(TransactionTable::new()),
        }
    }
}
