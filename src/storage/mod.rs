//! Storage layer abstractions for Trellis.
//!
//! This module provides a trait-based abstraction over the durable
//! key/value store that persists Vector/Role/User/Collection records and
//! the monotonic id allocators. The engine consumes this surface — get,
//! put, delete, range load, and id allocation — without designing the
//! store itself; the primary backend is redb.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │                 TrellisDb                      │
//! │                     │                          │
//! │                     ▼                          │
//! │            ┌─────────────────┐                 │
//! │            │  StorageEngine  │  ← Trait        │
//! │            └─────────────────┘                 │
//! │                     ▲                          │
//! │                     │                          │
//! │              ┌──────┴──────┐                   │
//! │              │ RedbStorage │                   │
//! │              └─────────────┘                   │
//! └────────────────────────────────────────────────┘
//! ```

pub mod redb;
pub mod schema;

pub use self::redb::RedbStorage;
pub use schema::{DatabaseMetadata, SCHEMA_VERSION};

use std::path::Path;

use crate::auth::{Role, User};
use crate::collection::CollectionRecord;
use crate::config::Config;
use crate::error::Result;
use crate::types::{CollectionId, VectorId, VectorRecord};

/// Storage engine trait for Trellis.
///
/// Implementations must be `Send + Sync`; the engine handles internal
/// synchronization. Every mutating method is atomic: either the whole
/// write lands or none of it does.
pub trait StorageEngine: Send + Sync {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Returns the database metadata.
    fn metadata(&self) -> &DatabaseMetadata;

    /// Closes the storage engine, flushing any pending writes.
    fn close(self: Box<Self>) -> Result<()>;

    /// Returns the path to the database file, if applicable.
    fn path(&self) -> Option<&Path>;

    // =========================================================================
    // Id Allocation
    // =========================================================================

    /// Issues the next id for the named counter, persisting the new high
    /// water mark in the same write transaction. Counters start at 1.
    fn allocate_id(&self, counter: &str) -> Result<u64>;

    // =========================================================================
    // Collection Records
    // =========================================================================

    /// Saves a collection descriptor, overwriting any previous version.
    fn save_collection(&self, record: &CollectionRecord) -> Result<()>;

    /// Lists all collection descriptors.
    fn list_collections(&self) -> Result<Vec<CollectionRecord>>;

    /// Deletes a collection and cascades: its vectors, its transaction
    /// counter, and the given updated user records (role assignments
    /// stripped by the caller) all land in one write transaction.
    ///
    /// Returns the number of vector records removed.
    fn delete_collection(&self, id: CollectionId, updated_users: &[User]) -> Result<u64>;

    // =========================================================================
    // Vector Records
    // =========================================================================

    /// Applies one committed transaction's puts and removes atomically.
    fn apply_vector_ops(
        &self,
        collection: CollectionId,
        puts: &[VectorRecord],
        removes: &[VectorId],
    ) -> Result<()>;

    /// Reads one committed vector record.
    fn get_vector(&self, collection: CollectionId, id: VectorId) -> Result<Option<VectorRecord>>;

    /// Loads every committed vector of a collection, ordered by id.
    fn load_vectors(&self, collection: CollectionId) -> Result<Vec<VectorRecord>>;

    // =========================================================================
    // Users and Roles
    // =========================================================================

    /// Saves a user record, overwriting any previous version.
    fn save_user(&self, user: &User) -> Result<()>;

    /// Lists all user records.
    fn list_users(&self) -> Result<Vec<User>>;

    /// Saves a role record, overwriting any previous version.
    fn save_role(&self, role: &Role) -> Result<()>;

    /// Lists all role records.
    fn list_roles(&self) -> Result<Vec<Role>>;
}

/// Opens a storage engine at the given path.
///
/// This is a convenience function that creates a [`RedbStorage`]
/// instance. For more control, use `RedbStorage::open()` directly.
pub fn open_storage(path: impl AsRef<Path>, config: &Config) -> Result<Box<dyn StorageEngine>> {
    let storage = RedbStorage::open(path, config)?;
    Ok(Box::new(storage))
}
