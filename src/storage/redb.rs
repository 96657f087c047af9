//! redb storage engine implementation.
//!
//! This module provides the primary storage backend for Trellis using
//! [redb](https://docs.rs/redb), a pure Rust embedded key-value store.
//!
//! # Features
//!
//! - ACID transactions with MVCC
//! - Single-writer, multiple-reader concurrency
//! - Automatic crash recovery
//! - Zero external dependencies (pure Rust)
//!
//! # File Layout
//!
//! When you open a database at `./trellis.db`, redb creates:
//! - `./trellis.db` - Main database file
//! - `./trellis.db.lock` - Lock file for writer coordination (may not be visible)

use std::path::{Path, PathBuf};

use ::redb::{Database, ReadableTable, WriteTransaction};
use tracing::{debug, info, instrument, warn};

use crate::auth::{Role, User};
use crate::collection::CollectionRecord;
use crate::config::Config;
use crate::error::{Result, StorageError, TrellisError};
use crate::types::{CollectionId, VectorId, VectorRecord};

use super::schema::{
    transaction_counter_key, vector_range, DatabaseMetadata, COLLECTIONS_TABLE, COUNTERS_TABLE,
    METADATA_TABLE, ROLES_TABLE, SCHEMA_VERSION, USERS_TABLE, VECTORS_TABLE,
};
use super::StorageEngine;

/// Metadata key in the metadata table.
const METADATA_KEY: &str = "db_metadata";

/// redb storage engine wrapper.
///
/// Holds the redb database handle, cached metadata, and the durability
/// level derived from the configured sync mode.
///
/// # Thread Safety
///
/// `RedbStorage` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbStorage {
    /// The redb database handle.
    db: Database,

    /// Cached database metadata.
    metadata: DatabaseMetadata,

    /// Path to the database file.
    path: PathBuf,

    /// Durability applied to every write transaction.
    durability: ::redb::Durability,
}

impl RedbStorage {
    /// Opens or creates a database at the given path.
    ///
    /// If the database doesn't exist, it will be created and initialized.
    /// If it exists, the stored schema version is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The database file is corrupted
    /// - The database is locked by another process
    /// - Schema version doesn't match
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let db_exists = path.exists();

        debug!(db_exists = db_exists, "Opening storage engine");

        let db = Self::create_database(path, config)?;
        let durability = config.sync_mode.durability();

        if db_exists {
            Self::open_existing(db, path.to_path_buf(), durability)
        } else {
            Self::initialize_new(db, path.to_path_buf(), durability)
        }
    }

    /// Creates the redb database with appropriate settings.
    fn create_database(path: &Path, _config: &Config) -> Result<Database> {
        let builder = Database::builder();

        // Note: redb 2.x doesn't have set_cache_size, it manages memory
        // internally. The cache_size_mb config is kept for future tuning.

        // Note: redb doesn't expose a typed error variant for lock
        // conflicts, so we detect them via error message string matching.
        let db = builder.create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StorageError::DatabaseLocked
            } else {
                StorageError::Redb(e.to_string())
            }
        })?;

        debug!("Database file opened successfully");
        Ok(db)
    }

    /// Initializes a new database with tables and metadata.
    #[instrument(skip(db, durability), fields(path = %path.display()))]
    fn initialize_new(
        db: Database,
        path: PathBuf,
        durability: ::redb::Durability,
    ) -> Result<Self> {
        info!("Initializing new database");

        let metadata = DatabaseMetadata::new();

        // Create all tables and write metadata in a single transaction
        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;

            let _ = write_txn.open_table(COLLECTIONS_TABLE)?;
            let _ = write_txn.open_table(VECTORS_TABLE)?;
            let _ = write_txn.open_table(USERS_TABLE)?;
            let _ = write_txn.open_table(ROLES_TABLE)?;
            let _ = write_txn.open_table(COUNTERS_TABLE)?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(schema_version = SCHEMA_VERSION, "Database initialized");

        Ok(Self {
            db,
            metadata,
            path,
            durability,
        })
    }

    /// Opens and validates an existing database.
    #[instrument(skip(db, durability), fields(path = %path.display()))]
    fn open_existing(
        db: Database,
        path: PathBuf,
        durability: ::redb::Durability,
    ) -> Result<Self> {
        info!("Opening existing database");

        let read_txn = db.begin_read().map_err(StorageError::from)?;
        let metadata = {
            let meta_table = read_txn.open_table(METADATA_TABLE).map_err(|e| {
                StorageError::corrupted(format!("Cannot open metadata table: {}", e))
            })?;

            let metadata_bytes = meta_table
                .get(METADATA_KEY)
                .map_err(StorageError::from)?
                .ok_or_else(|| StorageError::corrupted("Missing database metadata"))?;

            bincode::deserialize::<DatabaseMetadata>(metadata_bytes.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid metadata format: {}", e)))?
        };
        drop(read_txn);

        if metadata.schema_version != SCHEMA_VERSION {
            warn!(
                expected = SCHEMA_VERSION,
                found = metadata.schema_version,
                "Schema version mismatch"
            );
            return Err(TrellisError::Storage(StorageError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION,
                found: metadata.schema_version,
            }));
        }

        // Update last_opened_at timestamp
        let mut metadata = metadata;
        metadata.touch();

        let write_txn = db.begin_write().map_err(StorageError::from)?;
        {
            let mut meta_table = write_txn.open_table(METADATA_TABLE)?;
            let metadata_bytes = bincode::serialize(&metadata)
                .map_err(|e| StorageError::serialization(e.to_string()))?;
            meta_table.insert(METADATA_KEY, metadata_bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        info!(
            schema_version = metadata.schema_version,
            "Database opened successfully"
        );

        Ok(Self {
            db,
            metadata,
            path,
            durability,
        })
    }

    /// Begins a write transaction with the configured durability.
    fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().map_err(StorageError::from)?;
        txn.set_durability(self.durability);
        Ok(txn)
    }
}

impl StorageEngine for RedbStorage {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    fn metadata(&self) -> &DatabaseMetadata {
        &self.metadata
    }

    #[instrument(skip(self))]
    fn close(self: Box<Self>) -> Result<()> {
        info!("Closing storage engine");

        // redb flushes all data durably on drop. Since `Database::drop` is
        // infallible, this method currently always returns Ok(()). The
        // Result return type is retained for backends that can report
        // flush errors.
        drop(self.db);

        info!("Storage engine closed");
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    // =========================================================================
    // Id Allocation
    // =========================================================================

    fn allocate_id(&self, counter: &str) -> Result<u64> {
        let write_txn = self.begin_write()?;
        let next = {
            let mut table = write_txn.open_table(COUNTERS_TABLE)?;
            let last = table.get(counter)?.map(|guard| guard.value()).unwrap_or(0);
            let next = last + 1;
            table.insert(counter, next)?;
            next
        };
        write_txn.commit().map_err(StorageError::from)?;
        Ok(next)
    }

    // =========================================================================
    // Collection Records
    // =========================================================================

    fn save_collection(&self, record: &CollectionRecord) -> Result<()> {
        let bytes =
            bincode::serialize(record).map_err(|e| StorageError::serialization(e.to_string()))?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(COLLECTIONS_TABLE)?;
            table.insert(record.id.0, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(id = %record.id, name = %record.name, "Collection saved");
        Ok(())
    }

    fn list_collections(&self) -> Result<Vec<CollectionRecord>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(COLLECTIONS_TABLE)?;

        let mut records = Vec::new();
        for entry in table.iter().map_err(StorageError::from)? {
            let (_, value) = entry.map_err(StorageError::from)?;
            let record: CollectionRecord = bincode::deserialize(value.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid collection record: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }

    #[instrument(skip(self, updated_users))]
    fn delete_collection(&self, id: CollectionId, updated_users: &[User]) -> Result<u64> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            collections.remove(id.0)?;

            // Cascade: vector records, the transaction counter, and the
            // stripped role assignments, all in this one transaction.
            let mut vectors = write_txn.open_table(VECTORS_TABLE)?;
            let keys: Vec<(u64, u64)> = {
                let mut keys = Vec::new();
                for entry in vectors.range(vector_range(id)).map_err(StorageError::from)? {
                    let (key, _) = entry.map_err(StorageError::from)?;
                    keys.push(key.value());
                }
                keys
            };
            for key in &keys {
                vectors.remove(key)?;
            }

            let mut counters = write_txn.open_table(COUNTERS_TABLE)?;
            counters.remove(transaction_counter_key(id).as_str())?;

            let mut users = write_txn.open_table(USERS_TABLE)?;
            for user in updated_users {
                let bytes = bincode::serialize(user)
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                users.insert(user.id.0, bytes.as_slice())?;
            }

            keys.len() as u64
        };
        write_txn.commit().map_err(StorageError::from)?;

        info!(collection = %id, vectors_removed = removed, "Collection deleted");
        Ok(removed)
    }

    // =========================================================================
    // Vector Records
    // =========================================================================

    fn apply_vector_ops(
        &self,
        collection: CollectionId,
        puts: &[VectorRecord],
        removes: &[VectorId],
    ) -> Result<()> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(VECTORS_TABLE)?;
            for record in puts {
                let bytes = bincode::serialize(record)
                    .map_err(|e| StorageError::serialization(e.to_string()))?;
                table.insert((collection.0, record.id.0), bytes.as_slice())?;
            }
            for id in removes {
                table.remove((collection.0, id.0))?;
            }
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(
            collection = %collection,
            puts = puts.len(),
            removes = removes.len(),
            "Vector operations persisted"
        );
        Ok(())
    }

    fn get_vector(&self, collection: CollectionId, id: VectorId) -> Result<Option<VectorRecord>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(VECTORS_TABLE)?;

        let Some(guard) = table.get((collection.0, id.0)).map_err(StorageError::from)? else {
            return Ok(None);
        };
        let record: VectorRecord = bincode::deserialize(guard.value())
            .map_err(|e| StorageError::corrupted(format!("Invalid vector record: {}", e)))?;
        Ok(Some(record))
    }

    fn load_vectors(&self, collection: CollectionId) -> Result<Vec<VectorRecord>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(VECTORS_TABLE)?;

        let mut records = Vec::new();
        for entry in table
            .range(vector_range(collection))
            .map_err(StorageError::from)?
        {
            let (_, value) = entry.map_err(StorageError::from)?;
            let record: VectorRecord = bincode::deserialize(value.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid vector record: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }

    // =========================================================================
    // Users and Roles
    // =========================================================================

    fn save_user(&self, user: &User) -> Result<()> {
        let bytes =
            bincode::serialize(user).map_err(|e| StorageError::serialization(e.to_string()))?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(USERS_TABLE)?;
            table.insert(user.id.0, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(id = %user.id, username = %user.username, "User saved");
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(USERS_TABLE)?;

        let mut users = Vec::new();
        for entry in table.iter().map_err(StorageError::from)? {
            let (_, value) = entry.map_err(StorageError::from)?;
            let user: User = bincode::deserialize(value.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid user record: {}", e)))?;
            users.push(user);
        }
        Ok(users)
    }

    fn save_role(&self, role: &Role) -> Result<()> {
        let bytes =
            bincode::serialize(role).map_err(|e| StorageError::serialization(e.to_string()))?;

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(ROLES_TABLE)?;
            table.insert(role.id.0, bytes.as_slice())?;
        }
        write_txn.commit().map_err(StorageError::from)?;

        debug!(id = %role.id, name = %role.name, "Role saved");
        Ok(())
    }

    fn list_roles(&self) -> Result<Vec<Role>> {
        let read_txn = self.db.begin_read().map_err(StorageError::from)?;
        let table = read_txn.open_table(ROLES_TABLE)?;

        let mut roles = Vec::new();
        for entry in table.iter().map_err(StorageError::from)? {
            let (_, value) = entry.map_err(StorageError::from)?;
            let role: Role = bincode::deserialize(value.value())
                .map_err(|e| StorageError::corrupted(format!("Invalid role record: {}", e)))?;
            roles.push(role);
        }
        Ok(roles)
    }
}
