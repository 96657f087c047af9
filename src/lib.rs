//! # Trellis
//!
//! Embedded multi-modal vector database: collections of dense, sparse,
//! and text-derived vectors with transactional mutation, similarity
//! search, and role-based access control on every operation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellisdb::prelude::*;
//!
//! // Open or create a database (seeds an admin role and a root user)
//! let db = TrellisDb::open("./trellis.db", Config::default())?;
//! let root = db.user_id("root").expect("seeded on first open");
//!
//! // Create a collection with a dense index
//! let docs = db.create_collection(root, CollectionSpec::named("docs"))?;
//! db.create_dense_index(root, docs.id, DenseIndexConfig::new(3, DistanceMetric::Cosine))?;
//!
//! // Mutate vectors transactionally
//! let txn = db.create_transaction(root, docs.id)?;
//! db.stage_create(root, docs.id, txn, VectorRecord::dense(VectorId(1), vec![0.1, 0.2, 0.3]))?;
//! db.commit_transaction(root, docs.id, txn)?;
//!
//! // Search committed state
//! let hits = db.search_dense(root, docs.id, &[0.1, 0.2, 0.3], 1)?;
//! assert_eq!(hits[0].id, VectorId(1));
//!
//! db.close()?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Collection
//!
//! A **collection** is an isolated namespace for vectors. Each holds at
//! most one dense (graph-based), one sparse (inverted), and one TF-IDF
//! index; a vector participates in whichever indexes match its populated
//! components.
//!
//! ### Transaction
//!
//! All vector mutation goes through a **transaction** scoped to one
//! collection: staged operations accumulate in a private buffer that is
//! invisible to reads and to other transactions, then commit applies the
//! whole buffer to every attached index atomically, or abort discards
//! it. Commits are serialized per collection; reads never observe a
//! partially-applied commit.
//!
//! ### Access Control
//!
//! Every operation is gated by **RBAC**: the acting user's role for the
//! target collection must grant the operation's permission. Users hold
//! at most one role per collection, with a database-wide scope as
//! fallback. Authentication is external; the engine trusts the caller's
//! already-verified user id.
//!
//! ## Thread Safety
//!
//! `TrellisDb` is `Send + Sync` and can be shared across threads using
//! `Arc`. Reads run concurrently with each other and with transaction
//! staging; the underlying storage uses MVCC with exclusive write
//! locking.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod db;
mod error;
mod types;

pub mod auth;
pub mod collection;
pub mod index;
pub mod storage;
pub mod transaction;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main database interface
pub use db::{TrellisDb, ADMIN_ROLE_NAME, ROOT_USERNAME};

// Configuration
pub use config::{Config, SyncMode};

// Error handling
pub use error::{NotFoundError, Result, SchemaError, StorageError, TrellisError};

// Core types
pub use types::{
    CollectionId, RoleId, SparseEntry, Timestamp, TransactionId, UserId, VectorId, VectorRecord,
};

// Access control
pub use auth::{Permission, PermissionSet, Role, User};

// Collections
pub use collection::{
    CollectionConfig, CollectionRecord, CollectionSpec, FieldKind, MetadataField, MetadataSchema,
};

// Indexes
pub use index::dense::{
    DenseIndexConfig, DistanceMetric, HnswParams, QuantizationMode, QuantizedKind,
};
pub use index::sparse::{SparseIndexConfig, SparseQuantization};
pub use index::tfidf::TfIdfIndexConfig;
pub use index::{IndexKind, SearchHit};

// Transactions
pub use transaction::{Transaction, TransactionStatus, VectorOp};

// Storage (for advanced users)
pub use storage::DatabaseMetadata;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common Trellis usage.
///
/// ```rust
/// use trellisdb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::auth::{Permission, PermissionSet};
    pub use crate::collection::CollectionSpec;
    pub use crate::config::Config;
    pub use crate::db::TrellisDb;
    pub use crate::error::{Result, TrellisError};
    pub use crate::index::dense::{DenseIndexConfig, DistanceMetric};
    pub use crate::index::sparse::SparseIndexConfig;
    pub use crate::index::tfidf::TfIdfIndexConfig;
    pub use crate::index::SearchHit;
    pub use crate::transaction::VectorOp;
    pub use crate::types::{CollectionId, SparseEntry, TransactionId, UserId, VectorId, VectorRecord};
}
