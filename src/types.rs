//! Core type definitions for Trellis identifiers, timestamps, and vectors.
//!
//! All entity ids are `u64` newtypes issued by a per-kind monotonic
//! allocator that is persisted alongside the entity tables, so a reopened
//! database resumes from the last issued id.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Collection identifier.
///
/// Collections are isolated namespaces for vectors, each with its own
/// set of indexes and its own transaction id sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub u64);

impl CollectionId {
    /// Reserved collection id used for database-wide role assignments.
    ///
    /// A role granted here applies to collection-independent operations
    /// (collection creation, user and role administration) and acts as a
    /// fallback for collections where the user has no explicit role.
    /// Regular collection ids are allocated starting from 1.
    pub const ADMIN_SCOPE: CollectionId = CollectionId(0);
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vector identifier, unique within a collection across all its indexes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VectorId(pub u64);

impl fmt::Display for VectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier, monotonically increasing per collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User identifier.
///
/// Trellis doesn't handle authentication — the consumer verifies
/// credentials and passes the resulting user id into every operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
///
/// Using i64 allows representing dates far into the future and past.
/// Millisecond precision is sufficient for transaction bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch (should never happen
    /// in practice), returns a timestamp of 0 (epoch) rather than panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One nonzero entry of a sparse vector: (dimension index, value).
///
/// Dimension indices must be unique within a vector; most dimensions are
/// implicitly zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseEntry(pub u32, pub f32);

impl SparseEntry {
    /// Returns the dimension index of this entry.
    #[inline]
    pub fn dimension(&self) -> u32 {
        self.0
    }

    /// Returns the value of this entry.
    #[inline]
    pub fn value(&self) -> f32 {
        self.1
    }
}

/// A multi-modal vector record.
///
/// A vector may carry any non-empty subset of a dense component, a sparse
/// component, and source text. Which indexes it participates in is
/// determined by which components are present and which indexes the
/// owning collection has enabled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    /// Vector id, unique within the collection.
    pub id: VectorId,

    /// Dense component: fixed-length f32 sequence matching the
    /// collection's dense index dimension.
    #[serde(default)]
    pub dense: Option<Vec<f32>>,

    /// Sparse component: (dimension index, value) pairs with unique
    /// indices.
    #[serde(default)]
    pub sparse: Option<Vec<SparseEntry>>,

    /// Source text, tokenized into the TF-IDF index.
    #[serde(default)]
    pub text: Option<String>,
}

impl VectorRecord {
    /// Creates a dense-only vector record.
    pub fn dense(id: VectorId, values: Vec<f32>) -> Self {
        Self {
            id,
            dense: Some(values),
            sparse: None,
            text: None,
        }
    }

    /// Creates a sparse-only vector record.
    pub fn sparse(id: VectorId, entries: Vec<SparseEntry>) -> Self {
        Self {
            id,
            dense: None,
            sparse: Some(entries),
            text: None,
        }
    }

    /// Creates a text-only vector record.
    pub fn text(id: VectorId, text: impl Into<String>) -> Self {
        Self {
            id,
            dense: None,
            sparse: None,
            text: Some(text.into()),
        }
    }

    /// Returns true if no component is populated.
    pub fn is_empty(&self) -> bool {
        self.dense.is_none() && self.sparse.is_none() && self.text.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(CollectionId(3).to_string(), "3");
        assert_eq!(VectorId(42).to_string(), "42");
        assert_eq!(TransactionId(7).to_string(), "7");
    }

    #[test]
    fn test_admin_scope_is_reserved() {
        assert_eq!(CollectionId::ADMIN_SCOPE, CollectionId(0));
    }

    #[test]
    fn test_timestamp_now() {
        let t1 = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let t2 = Timestamp::now();
        assert!(t1 < t2, "Timestamps should be ordered");
    }

    #[test]
    fn test_vector_record_builders() {
        let v = VectorRecord::dense(VectorId(1), vec![0.1, 0.2]);
        assert!(v.dense.is_some());
        assert!(v.sparse.is_none());
        assert!(!v.is_empty());

        let v = VectorRecord::sparse(VectorId(2), vec![SparseEntry(4, 0.5)]);
        assert_eq!(v.sparse.as_ref().unwrap()[0].dimension(), 4);

        let v = VectorRecord::text(VectorId(3), "hello");
        assert_eq!(v.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_empty_record_detected() {
        let v = VectorRecord {
            id: VectorId(1),
            dense: None,
            sparse: None,
            text: None,
        };
        assert!(v.is_empty());
    }

    #[test]
    fn test_record_serialization() {
        let v = VectorRecord {
            id: VectorId(9),
            dense: Some(vec![1.0, 2.0]),
            sparse: Some(vec![SparseEntry(0, 0.25)]),
            text: Some("doc".to_string()),
        };
        let bytes = bincode::serialize(&v).unwrap();
        let restored: VectorRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(v, restored);
    }
}
