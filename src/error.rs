//! Error types for Trellis.
//!
//! Trellis uses a hierarchical error system:
//! - `TrellisError` is the top-level error returned by all public APIs
//! - Specific error types (`StorageError`, `SchemaError`, `NotFoundError`)
//!   provide detail
//!
//! Validation failures are detected before any shared state is mutated, so
//! an `Err` from a mutating call means the engine state is unchanged. The
//! one exception is `Storage` during commit: the in-flight transaction is
//! aborted and the failure surfaced, with no index left partially updated.
//! Nothing is retried internally — retry policy belongs to the caller.

use thiserror::Error;

use crate::types::{CollectionId, RoleId, TransactionId, UserId, VectorId};

/// Result type alias for Trellis operations.
pub type Result<T> = std::result::Result<T, TrellisError>;

/// Top-level error enum for all Trellis operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching to handle specific error cases.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Storage layer error (I/O, corruption, transactions).
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Vector shape disagrees with collection or index configuration.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Requested entity not found.
    #[error("{0}")]
    NotFound(#[from] NotFoundError),

    /// The access-control check rejected the operation.
    #[error("Permission denied: {reason}")]
    PermissionDenied {
        /// Why the operation was rejected.
        reason: String,
    },

    /// Operation on a transaction or index in the wrong lifecycle state.
    #[error("Invalid state: {reason}")]
    InvalidState {
        /// Description of the state conflict.
        reason: String,
    },

    /// The collection's configured maximum vector count would be exceeded.
    #[error("Capacity exceeded: collection allows at most {limit} vectors, commit would reach {attempted}")]
    CapacityExceeded {
        /// Configured maximum vector count.
        limit: u64,
        /// Vector count the commit would have produced.
        attempted: u64,
    },

    /// Vector id collision, either within one transaction buffer or with
    /// an already-committed id on Create.
    #[error("Duplicate vector id {id}: {reason}")]
    DuplicateId {
        /// The colliding id.
        id: VectorId,
        /// Where the collision was detected.
        reason: String,
    },

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrellisError {
    /// Creates a permission-denied error with the given reason.
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Creates an invalid-state error with the given reason.
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    /// Creates a duplicate-id error for the given vector id.
    pub fn duplicate_id(id: VectorId, reason: impl Into<String>) -> Self {
        Self::DuplicateId {
            id,
            reason: reason.into(),
        }
    }

    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is a permission-denied error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Returns true if this is a schema error.
    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema(_))
    }

    /// Returns true if this is an invalid-state error.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// Returns true if this is a duplicate-id error.
    pub fn is_duplicate_id(&self) -> bool {
        matches!(self, Self::DuplicateId { .. })
    }

    /// Returns true if this is a storage error.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Storage-related errors.
///
/// These errors indicate problems with the underlying storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database file or data is corrupted.
    #[error("Database corrupted: {0}")]
    Corrupted(String),

    /// Database is locked by another process.
    #[error("Database is locked by another writer")]
    DatabaseLocked,

    /// Transaction failed (commit, rollback, etc.).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),

    /// Database schema version doesn't match expected version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Expected schema version.
        expected: u32,
        /// Actual schema version found in database.
        found: u32,
    },
}

impl StorageError {
    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a transaction error with the given message.
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Creates a redb error with the given message.
    pub fn redb(msg: impl Into<String>) -> Self {
        Self::Redb(msg.into())
    }
}

// Conversions from redb error types
impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Redb(format!("Storage error: {}", err))
    }
}

// Convert bincode errors to StorageError
impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

// Also allow direct conversion to TrellisError for convenience
impl From<redb::Error> for TrellisError {
    fn from(err: redb::Error) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<redb::DatabaseError> for TrellisError {
    fn from(err: redb::DatabaseError) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<redb::TransactionError> for TrellisError {
    fn from(err: redb::TransactionError) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<redb::CommitError> for TrellisError {
    fn from(err: redb::CommitError) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<redb::TableError> for TrellisError {
    fn from(err: redb::TableError) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<redb::StorageError> for TrellisError {
    fn from(err: redb::StorageError) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

impl From<bincode::Error> for TrellisError {
    fn from(err: bincode::Error) -> Self {
        TrellisError::Storage(StorageError::from(err))
    }
}

/// Schema errors for vector and index shape validation.
///
/// These errors indicate that caller-provided data disagrees with the
/// collection or index configuration. Violating inputs are rejected,
/// never silently truncated or padded.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Dense component length doesn't match the collection's configured
    /// dimension.
    #[error("Dense dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from the dense index configuration.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A vector carried no dense, sparse, or text component at all.
    #[error("Vector {id} has no components")]
    EmptyVector {
        /// The offending vector id.
        id: VectorId,
    },

    /// A sparse component repeats a dimension index.
    #[error("Sparse component repeats dimension index {index}")]
    DuplicateSparseDimension {
        /// The repeated dimension index.
        index: u32,
    },

    /// A vector component requires an index kind the collection doesn't
    /// have enabled.
    #[error("Collection has no {kind} index enabled")]
    IndexNotEnabled {
        /// Which index kind is missing.
        kind: &'static str,
    },

    /// The collection already has an index of this kind attached.
    #[error("Collection already has a {kind} index")]
    IndexAlreadyExists {
        /// Which index kind collided.
        kind: &'static str,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },
}

impl SchemaError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Not found errors for specific entity types.
#[derive(Debug, Error)]
pub enum NotFoundError {
    /// Collection with given id not found.
    #[error("Collection not found: {0}")]
    Collection(CollectionId),

    /// Collection with given name not found.
    #[error("Collection not found: {0}")]
    CollectionName(String),

    /// Vector with given id not found in the collection.
    #[error("Vector not found: {0}")]
    Vector(VectorId),

    /// Transaction with given id not found.
    #[error("Transaction not found: {0}")]
    Transaction(TransactionId),

    /// User with given id not found.
    #[error("User not found: {0}")]
    User(UserId),

    /// Role with given id not found.
    #[error("Role not found: {0}")]
    Role(RoleId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrellisError::config("cache size must be positive");
        assert_eq!(
            err.to_string(),
            "Configuration error: cache size must be positive"
        );
    }

    #[test]
    fn test_schema_error_display() {
        let err = SchemaError::dimension_mismatch(3, 5);
        assert_eq!(err.to_string(), "Dense dimension mismatch: expected 3, got 5");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SchemaVersionMismatch {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Schema version mismatch: expected 2, found 1"
        );
    }

    #[test]
    fn test_not_found_error_display() {
        let err = NotFoundError::Vector(VectorId(42));
        assert_eq!(err.to_string(), "Vector not found: 42");
    }

    #[test]
    fn test_is_not_found() {
        let err: TrellisError = NotFoundError::Collection(CollectionId(7)).into();
        assert!(err.is_not_found());
        assert!(!err.is_schema());
    }

    #[test]
    fn test_is_permission_denied() {
        let err = TrellisError::permission_denied("no role assigned");
        assert!(err.is_permission_denied());
        assert!(!err.is_storage());
    }

    #[test]
    fn test_is_duplicate_id() {
        let err = TrellisError::duplicate_id(VectorId(1), "already committed");
        assert!(err.is_duplicate_id());
        assert_eq!(
            err.to_string(),
            "Duplicate vector id 1: already committed"
        );
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(StorageError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.is_err());
        assert!(result.unwrap_err().is_storage());
    }
}
