//! Trellis main struct and engine operations.
//!
//! The [`TrellisDb`] struct is the primary interface for interacting
//! with the database. It provides methods for:
//!
//! - Opening and closing the database
//! - Managing collections and their indexes
//! - Transactional vector mutation (create / upsert / delete)
//! - Point reads and similarity search
//! - Role and user administration
//!
//! Every operation takes the acting, already-authenticated [`UserId`]
//! and is gated by the RBAC check before it touches any state.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trellisdb::{Config, CollectionSpec, TrellisDb, VectorRecord, VectorId, VectorOp};
//!
//! let db = TrellisDb::open("./trellis.db", Config::default())?;
//! let root = db.user_id("root").expect("seeded");
//!
//! let collection = db.create_collection(root, CollectionSpec::named("docs"))?;
//! db.create_dense_index(root, collection.id, DenseIndexConfig::new(3, DistanceMetric::Cosine))?;
//!
//! let txn = db.create_transaction(root, collection.id)?;
//! db.stage_create(root, collection.id, txn, VectorRecord::dense(VectorId(1), vec![0.1, 0.2, 0.3]))?;
//! db.commit_transaction(root, collection.id, txn)?;
//!
//! let hits = db.search_dense(root, collection.id, &[0.1, 0.2, 0.3], 1)?;
//! db.close()?;
//! ```
//!
//! # Thread Safety
//!
//! `TrellisDb` is `Send + Sync` and can be shared across threads using
//! `Arc`. Reads run against the latest fully-committed state; commits
//! are serialized per collection by a commit turnstile, and commits to
//! different collections proceed in parallel.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{info, instrument, warn};

use crate::auth::{AccessState, Permission, PermissionSet, Role, User};
use crate::collection::{CollectionHandle, CollectionRecord, CollectionSpec, CollectionState};
use crate::config::Config;
use crate::error::{NotFoundError, Result, TrellisError};
use crate::index::dense::DenseIndexConfig;
use crate::index::sparse::SparseIndexConfig;
use crate::index::tfidf::TfIdfIndexConfig;
use crate::index::SearchHit;
use crate::storage::schema::{
    transaction_counter_key, COUNTER_COLLECTION, COUNTER_ROLE, COUNTER_USER,
};
use crate::storage::{open_storage, DatabaseMetadata, StorageEngine};
use crate::transaction::{
    resolve_ops, ResolvedOp, Transaction, TransactionStatus, VectorOp,
};
use crate::types::{CollectionId, RoleId, SparseEntry, TransactionId, UserId, VectorId, VectorRecord};

/// Name of the role seeded with every permission on first initialization.
pub const ADMIN_ROLE_NAME: &str = "admin";

/// Name of the user seeded with the admin role on first initialization.
pub const ROOT_USERNAME: &str = "root";

/// In-memory collection registry: handles by id plus a name index.
#[derive(Default)]
struct Registry {
    by_id: BTreeMap<CollectionId, Arc<CollectionHandle>>,
    by_name: BTreeMap<String, CollectionId>,
}

/// The main Trellis database handle.
///
/// Create an instance with [`TrellisDb::open()`] and close it with
/// [`TrellisDb::close()`].
pub struct TrellisDb {
    /// Storage engine (redb behind the `StorageEngine` trait).
    storage: Box<dyn StorageEngine>,

    /// Configuration used to open this database.
    config: Config,

    /// Live collections.
    collections: RwLock<Registry>,

    /// Users and roles.
    access: RwLock<AccessState>,
}

impl std::fmt::Debug for TrellisDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrellisDb")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn poisoned(what: &str) -> TrellisError {
    TrellisError::invalid_state(format!("{what} lock poisoned"))
}

impl TrellisDb {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens or creates a Trellis database at the specified path.
    ///
    /// A fresh database is seeded with an `admin` role holding every
    /// permission and a `root` user granted that role database-wide, so
    /// the instance is administrable from the start. On an existing
    /// database, collections, users, and roles are loaded and every
    /// index is rebuilt from the committed vectors.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the database
    /// file is corrupted or locked, or the schema version doesn't match.
    #[instrument(skip(config), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;

        info!("Opening Trellis");
        let storage = open_storage(&path, &config)?;

        // Seed the admin role and root user on first initialization.
        let mut roles = storage.list_roles()?;
        let mut users = storage.list_users()?;
        if roles.is_empty() && users.is_empty() {
            let role = Role::new(
                RoleId(storage.allocate_id(COUNTER_ROLE)?),
                ADMIN_ROLE_NAME,
                PermissionSet::all(),
            );
            storage.save_role(&role)?;

            let mut root = User::new(
                UserId(storage.allocate_id(COUNTER_USER)?),
                ROOT_USERNAME,
                // Credential verification is external; the seeded hash is
                // empty until an administrator sets one.
                "",
            );
            root.roles.insert(CollectionId::ADMIN_SCOPE, role.id);
            storage.save_user(&root)?;

            info!(role = %role.name, user = %root.username, "Seeded initial role and user");
            roles.push(role);
            users.push(root);
        }
        let access = AccessState::from_records(users, roles);

        // Rebuild every collection's indexes from committed vectors.
        let mut registry = Registry::default();
        for record in storage.list_collections()? {
            let id = record.id;
            let name = record.name.clone();
            let mut state = CollectionState::from_record(record)?;
            for vector in storage.load_vectors(id)? {
                state.restore(vector);
            }
            let handle = Arc::new(CollectionHandle::new(state));
            registry.by_name.insert(name, id);
            registry.by_id.insert(id, handle);
        }

        info!(
            collections = registry.by_id.len(),
            "Trellis opened successfully"
        );

        Ok(Self {
            storage,
            config,
            collections: RwLock::new(registry),
            access: RwLock::new(access),
        })
    }

    /// Closes the database, flushing all pending writes.
    ///
    /// This method consumes the `TrellisDb` instance, ensuring it cannot
    /// be used after closing.
    #[instrument(skip(self))]
    pub fn close(self) -> Result<()> {
        info!("Closing Trellis");
        self.storage.close()?;
        info!("Trellis closed successfully");
        Ok(())
    }

    /// Returns a reference to the database configuration.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the database metadata.
    #[inline]
    pub fn metadata(&self) -> &DatabaseMetadata {
        self.storage.metadata()
    }

    /// Resolves a username to its user id.
    ///
    /// This is the bootstrap hook for callers that verify credentials
    /// externally and then act under the resolved identity.
    pub fn user_id(&self, username: &str) -> Option<UserId> {
        self.access
            .read()
            .ok()?
            .user_by_name(username)
            .map(|user| user.id)
    }

    /// Returns the stored credential hash for a username, for external
    /// verification. The engine never interprets this value.
    pub fn credential_hash(&self, username: &str) -> Option<String> {
        self.access
            .read()
            .ok()?
            .user_by_name(username)
            .map(|user| user.credential_hash.clone())
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// The RBAC gate. Every public operation calls this first; failure
    /// short-circuits with no side effects.
    fn check(&self, user: UserId, collection: CollectionId, permission: Permission) -> Result<()> {
        self.access
            .read()
            .map_err(|_| poisoned("access table"))?
            .check(user, collection, permission)
    }

    fn handle(&self, collection: CollectionId) -> Result<Arc<CollectionHandle>> {
        self.collections
            .read()
            .map_err(|_| poisoned("collection registry"))?
            .by_id
            .get(&collection)
            .cloned()
            .ok_or_else(|| NotFoundError::Collection(collection).into())
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Creates a collection. Requires `create_collection` at the
    /// database-wide scope.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub fn create_collection(&self, user: UserId, spec: CollectionSpec) -> Result<CollectionRecord> {
        self.check(user, CollectionId::ADMIN_SCOPE, Permission::CreateCollection)?;
        spec.validate()?;

        let mut registry = self
            .collections
            .write()
            .map_err(|_| poisoned("collection registry"))?;
        if registry.by_name.contains_key(&spec.name) {
            return Err(TrellisError::invalid_state(format!(
                "collection '{}' already exists",
                spec.name
            )));
        }

        let id = CollectionId(self.storage.allocate_id(COUNTER_COLLECTION)?);
        let record = CollectionRecord::from_spec(id, spec);
        self.storage.save_collection(&record)?;

        let state = CollectionState::from_record(record.clone())?;
        registry.by_name.insert(record.name.clone(), id);
        registry.by_id.insert(id, Arc::new(CollectionHandle::new(state)));

        info!(collection = %id, name = %record.name, "Collection created");
        Ok(record)
    }

    /// Returns a collection's descriptor.
    pub fn get_collection(&self, user: UserId, collection: CollectionId) -> Result<CollectionRecord> {
        self.check(user, collection, Permission::ListCollections)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        Ok(state.record.clone())
    }

    /// Resolves a collection by name.
    pub fn find_collection(&self, user: UserId, name: &str) -> Result<CollectionRecord> {
        let id = self
            .collections
            .read()
            .map_err(|_| poisoned("collection registry"))?
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| NotFoundError::CollectionName(name.to_string()))?;
        self.get_collection(user, id)
    }

    /// Lists the collections the user holds `list_collections` on.
    pub fn list_collections(&self, user: UserId) -> Result<Vec<CollectionRecord>> {
        // Surface unknown users instead of an empty listing.
        self.access
            .read()
            .map_err(|_| poisoned("access table"))?
            .user(user)
            .ok_or(NotFoundError::User(user))?;

        let handles: Vec<Arc<CollectionHandle>> = {
            let registry = self
                .collections
                .read()
                .map_err(|_| poisoned("collection registry"))?;
            registry.by_id.values().cloned().collect()
        };

        let mut records = Vec::new();
        for handle in handles {
            if self.check(user, handle.id, Permission::ListCollections).is_ok() {
                let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
                records.push(state.record.clone());
            }
        }
        Ok(records)
    }

    /// Number of committed vectors in a collection.
    pub fn vector_count(&self, user: UserId, collection: CollectionId) -> Result<u64> {
        self.check(user, collection, Permission::ListCollections)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        Ok(state.vector_count())
    }

    /// Deletes a collection, cascading to its indexes, vectors, counters,
    /// and role assignments.
    #[instrument(skip(self))]
    pub fn delete_collection(&self, user: UserId, collection: CollectionId) -> Result<()> {
        self.check(user, collection, Permission::DeleteCollection)?;
        let handle = self.handle(collection)?;

        // Block commits while the collection goes away.
        let _turnstile = handle
            .commit_turnstile
            .lock()
            .map_err(|_| poisoned("commit turnstile"))?;

        // Compute the stripped user records first so the storage cascade
        // is a single atomic write; memory follows only on success.
        let stripped: Vec<User> = {
            let access = self.access.read().map_err(|_| poisoned("access table"))?;
            access
                .users()
                .filter(|u| u.roles.contains_key(&collection))
                .map(|u| {
                    let mut updated = u.clone();
                    updated.roles.remove(&collection);
                    updated
                })
                .collect()
        };
        let removed = self.storage.delete_collection(collection, &stripped)?;

        self.access
            .write()
            .map_err(|_| poisoned("access table"))?
            .forget_collection(collection);
        let mut registry = self
            .collections
            .write()
            .map_err(|_| poisoned("collection registry"))?;
        registry.by_name.remove(&handle.name);
        registry.by_id.remove(&collection);

        info!(collection = %collection, vectors_removed = removed, "Collection deleted");
        Ok(())
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Attaches a dense index to a collection. At most one per
    /// collection; the configuration is immutable afterwards.
    #[instrument(skip(self, config))]
    pub fn create_dense_index(
        &self,
        user: UserId,
        collection: CollectionId,
        config: DenseIndexConfig,
    ) -> Result<()> {
        self.check(user, collection, Permission::CreateIndex)?;
        let handle = self.handle(collection)?;
        let _turnstile = handle
            .commit_turnstile
            .lock()
            .map_err(|_| poisoned("commit turnstile"))?;
        let mut state = handle.state.write().map_err(|_| poisoned("collection state"))?;
        if state.record.dense_index.is_some() {
            return Err(crate::error::SchemaError::IndexAlreadyExists { kind: "dense" }.into());
        }

        let index = crate::index::dense::DenseIndex::new(config.clone())?;
        let mut record = state.record.clone();
        record.dense_index = Some(config);
        self.storage.save_collection(&record)?;
        state.record = record;
        state.dense = Some(index);

        info!(collection = %collection, "Dense index created");
        Ok(())
    }

    /// Attaches a sparse index to a collection.
    #[instrument(skip(self, config))]
    pub fn create_sparse_index(
        &self,
        user: UserId,
        collection: CollectionId,
        config: SparseIndexConfig,
    ) -> Result<()> {
        self.check(user, collection, Permission::CreateIndex)?;
        let handle = self.handle(collection)?;
        let _turnstile = handle
            .commit_turnstile
            .lock()
            .map_err(|_| poisoned("commit turnstile"))?;
        let mut state = handle.state.write().map_err(|_| poisoned("collection state"))?;
        if state.record.sparse_index.is_some() {
            return Err(crate::error::SchemaError::IndexAlreadyExists { kind: "sparse" }.into());
        }

        let mut record = state.record.clone();
        record.sparse_index = Some(config);
        self.storage.save_collection(&record)?;
        state.record = record;
        state.sparse = Some(crate::index::sparse::SparseIndex::new(config));

        info!(collection = %collection, "Sparse index created");
        Ok(())
    }

    /// Attaches a TF-IDF index to a collection.
    #[instrument(skip(self, config))]
    pub fn create_tfidf_index(
        &self,
        user: UserId,
        collection: CollectionId,
        config: TfIdfIndexConfig,
    ) -> Result<()> {
        self.check(user, collection, Permission::CreateIndex)?;
        let handle = self.handle(collection)?;
        let _turnstile = handle
            .commit_turnstile
            .lock()
            .map_err(|_| poisoned("commit turnstile"))?;
        let mut state = handle.state.write().map_err(|_| poisoned("collection state"))?;
        if state.record.tfidf_index.is_some() {
            return Err(crate::error::SchemaError::IndexAlreadyExists { kind: "tf-idf" }.into());
        }

        let mut record = state.record.clone();
        record.tfidf_index = Some(config);
        self.storage.save_collection(&record)?;
        state.record = record;
        state.tfidf = Some(crate::index::tfidf::TfIdfIndex::new(config));

        info!(collection = %collection, "TF-IDF index created");
        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens a transaction against a collection. Transaction ids are
    /// monotonically increasing per collection and survive restarts.
    pub fn create_transaction(&self, user: UserId, collection: CollectionId) -> Result<TransactionId> {
        self.check(user, collection, Permission::CreateTransaction)?;
        let handle = self.handle(collection)?;

        let id = TransactionId(
            self.storage
                .allocate_id(transaction_counter_key(collection).as_str())?,
        );
        handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?
            .begin(Transaction::new(id, collection));

        info!(collection = %collection, transaction = %id, "Transaction opened");
        Ok(id)
    }

    /// Stages a vector Create into a transaction's buffer.
    pub fn stage_create(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
        record: VectorRecord,
    ) -> Result<()> {
        self.stage(user, collection, transaction, VectorOp::Create(record), Permission::CreateVectors)
    }

    /// Stages a vector Upsert into a transaction's buffer.
    pub fn stage_upsert(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
        record: VectorRecord,
    ) -> Result<()> {
        self.stage(user, collection, transaction, VectorOp::Upsert(record), Permission::UpsertVectors)
    }

    /// Stages a vector Delete into a transaction's buffer.
    pub fn stage_delete(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
        vector: VectorId,
    ) -> Result<()> {
        self.stage(user, collection, transaction, VectorOp::Delete(vector), Permission::DeleteVectors)
    }

    fn stage(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
        op: VectorOp,
        permission: Permission,
    ) -> Result<()> {
        // The RBAC gate runs before anything else so a denied stage
        // leaves the buffer untouched.
        self.check(user, collection, permission)?;
        let handle = self.handle(collection)?;

        let mut table = handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?;
        table.ensure_active(transaction)?;

        // Shape validation against the collection configuration happens
        // at stage time; existence and capacity checks wait for commit.
        if let VectorOp::Create(record) | VectorOp::Upsert(record) = &op {
            let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
            state.validate_record(record)?;
        }
        table.stage(transaction, op)
    }

    /// Commits a transaction: validates the full buffer against committed
    /// state, persists the result, then applies it to every attached
    /// index in one step. On any validation or storage failure nothing is
    /// applied and the transaction becomes Aborted with the error
    /// surfaced.
    #[instrument(skip(self))]
    pub fn commit_transaction(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
    ) -> Result<()> {
        self.check(user, collection, Permission::CreateTransaction)?;
        let handle = self.handle(collection)?;

        let txn = handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?
            .take_active(transaction)?;

        // Per-collection commit turnstile: one commit finalizes at a
        // time; commits to other collections proceed in parallel.
        let _turnstile = handle
            .commit_turnstile
            .lock()
            .map_err(|_| poisoned("commit turnstile"))?;

        let result = self.apply_commit(&handle, &txn);
        let status = if result.is_ok() {
            TransactionStatus::Committed
        } else {
            TransactionStatus::Aborted
        };
        handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?
            .record_terminal(transaction, status);

        match &result {
            Ok(()) => info!(
                collection = %collection,
                transaction = %transaction,
                ops = txn.ops.len(),
                "Transaction committed"
            ),
            Err(error) => warn!(
                collection = %collection,
                transaction = %transaction,
                %error,
                "Transaction aborted at commit"
            ),
        }
        result
    }

    fn apply_commit(&self, handle: &CollectionHandle, txn: &Transaction) -> Result<()> {
        let resolved = resolve_ops(&txn.ops)?;

        // Validate everything against committed state before touching it.
        let (puts, removes) = {
            let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
            let mut puts: Vec<VectorRecord> = Vec::new();
            let mut removes: Vec<VectorId> = Vec::new();
            let mut projected = state.vector_count() as i64;

            for op in &resolved {
                match op {
                    ResolvedOp::Put { record, is_create } => {
                        state.validate_record(record)?;
                        let exists = state.vectors.contains_key(&record.id);
                        if *is_create && exists {
                            return Err(TrellisError::duplicate_id(
                                record.id,
                                "id already committed in this collection",
                            ));
                        }
                        if !exists {
                            projected += 1;
                        }
                        // Mirror the in-memory text-strip so storage and
                        // state agree on the stored form.
                        let mut stored = record.clone();
                        if let Some(tfidf) = &state.tfidf {
                            if !tfidf.config().store_raw_text {
                                stored.text = None;
                            }
                        }
                        puts.push(stored);
                    }
                    ResolvedOp::Remove { id, buffered_only } => {
                        if state.vectors.contains_key(id) {
                            projected -= 1;
                            removes.push(*id);
                        } else if !buffered_only {
                            return Err(NotFoundError::Vector(*id).into());
                        }
                    }
                }
            }

            if let Some(limit) = state.record.config.max_vector_count {
                if projected > limit as i64 {
                    return Err(TrellisError::CapacityExceeded {
                        limit,
                        attempted: projected as u64,
                    });
                }
            }
            (puts, removes)
        };

        // Durable first: a storage failure here aborts the transaction
        // with every index untouched.
        self.storage.apply_vector_ops(handle.id, &puts, &removes)?;

        // Single commit point: the state write lock is held while every
        // attached index absorbs the buffer, so readers see all of it or
        // none of it.
        let mut state = handle.state.write().map_err(|_| poisoned("collection state"))?;
        state.apply_resolved(&resolved);

        // If this commit completed an auto-quantization sample, persist
        // the frozen range so a rebuild reuses the same buckets. Best
        // effort: the commit itself already landed.
        if let Some(range) = state.dense.as_mut().and_then(|d| d.take_frozen_range()) {
            let mut record = state.record.clone();
            if let Some(config) = record.dense_index.as_mut() {
                config.frozen_range = Some(range);
            }
            match self.storage.save_collection(&record) {
                Ok(()) => state.record = record,
                Err(error) => warn!(%error, "Failed to persist frozen quantization range"),
            }
        }
        Ok(())
    }

    /// Aborts a transaction, discarding its buffer. Idempotent on an
    /// already-aborted transaction; fails with `InvalidState` on a
    /// committed one. Never blocks on in-flight commits of other
    /// transactions.
    pub fn abort_transaction(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
    ) -> Result<()> {
        self.check(user, collection, Permission::CreateTransaction)?;
        let handle = self.handle(collection)?;
        handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?
            .abort(transaction)?;
        info!(collection = %collection, transaction = %transaction, "Transaction aborted");
        Ok(())
    }

    /// Returns the lifecycle status of a transaction, if known.
    pub fn transaction_status(
        &self,
        user: UserId,
        collection: CollectionId,
        transaction: TransactionId,
    ) -> Result<Option<TransactionStatus>> {
        self.check(user, collection, Permission::CreateTransaction)?;
        let handle = self.handle(collection)?;
        let table = handle
            .transactions
            .lock()
            .map_err(|_| poisoned("transaction table"))?;
        Ok(table.status(transaction))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Reads a committed vector by id. Active transaction buffers are
    /// invisible here.
    pub fn get_vector(
        &self,
        user: UserId,
        collection: CollectionId,
        vector: VectorId,
    ) -> Result<VectorRecord> {
        self.check(user, collection, Permission::GetVectors)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        state
            .vectors
            .get(&vector)
            .cloned()
            .ok_or_else(|| NotFoundError::Vector(vector).into())
    }

    /// Nearest-neighbor search over the dense index.
    pub fn search_dense(
        &self,
        user: UserId,
        collection: CollectionId,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check(user, collection, Permission::QueryVectors)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        let Some(index) = &state.dense else {
            return Err(TrellisError::invalid_state(format!(
                "collection '{}' has no dense index",
                handle.name
            )));
        };
        Ok(index.search(query, top_k)?)
    }

    /// Top-k search over the sparse index with optional early
    /// termination.
    pub fn search_sparse(
        &self,
        user: UserId,
        collection: CollectionId,
        query: &[SparseEntry],
        top_k: usize,
        early_termination: Option<f32>,
    ) -> Result<Vec<SearchHit>> {
        self.check(user, collection, Permission::QueryVectors)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        let Some(index) = &state.sparse else {
            return Err(TrellisError::invalid_state(format!(
                "collection '{}' has no sparse index",
                handle.name
            )));
        };
        Ok(index.search(query, top_k, early_termination)?)
    }

    /// Top-k text search over the TF-IDF index.
    pub fn search_text(
        &self,
        user: UserId,
        collection: CollectionId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check(user, collection, Permission::QueryVectors)?;
        let handle = self.handle(collection)?;
        let state = handle.state.read().map_err(|_| poisoned("collection state"))?;
        let Some(index) = &state.tfidf else {
            return Err(TrellisError::invalid_state(format!(
                "collection '{}' has no tf-idf index",
                handle.name
            )));
        };
        Ok(index.search(query, top_k))
    }

    // =========================================================================
    // Role and User Administration
    // =========================================================================

    /// Creates a role. Requires `manage_permissions` at the database-wide
    /// scope.
    pub fn create_role(
        &self,
        user: UserId,
        name: &str,
        permissions: PermissionSet,
    ) -> Result<Role> {
        self.check(user, CollectionId::ADMIN_SCOPE, Permission::ManagePermissions)?;
        if name.trim().is_empty() {
            return Err(crate::error::SchemaError::invalid_field("name", "must not be empty").into());
        }
        {
            let access = self.access.read().map_err(|_| poisoned("access table"))?;
            if access.role_name_taken(name) {
                return Err(TrellisError::invalid_state(format!(
                    "role '{name}' already exists"
                )));
            }
        }

        let role = Role::new(RoleId(self.storage.allocate_id(COUNTER_ROLE)?), name, permissions);
        self.storage.save_role(&role)?;
        self.access
            .write()
            .map_err(|_| poisoned("access table"))?
            .insert_role(role.clone());

        info!(role = %role.name, id = %role.id, "Role created");
        Ok(role)
    }

    /// Creates a user with no role assignments. Requires
    /// `manage_permissions` at the database-wide scope.
    pub fn create_user(
        &self,
        user: UserId,
        username: &str,
        credential_hash: &str,
    ) -> Result<User> {
        self.check(user, CollectionId::ADMIN_SCOPE, Permission::ManagePermissions)?;
        if username.trim().is_empty() {
            return Err(
                crate::error::SchemaError::invalid_field("username", "must not be empty").into(),
            );
        }
        {
            let access = self.access.read().map_err(|_| poisoned("access table"))?;
            if access.user_by_name(username).is_some() {
                return Err(TrellisError::invalid_state(format!(
                    "user '{username}' already exists"
                )));
            }
        }

        let record = User::new(
            UserId(self.storage.allocate_id(COUNTER_USER)?),
            username,
            credential_hash,
        );
        self.storage.save_user(&record)?;
        self.access
            .write()
            .map_err(|_| poisoned("access table"))?
            .insert_user(record.clone());

        info!(username = %record.username, id = %record.id, "User created");
        Ok(record)
    }

    /// Assigns `role` to `target` for `collection`, replacing any
    /// previous assignment there. Requires `manage_permissions` for that
    /// collection — a user without it cannot alter roles, including
    /// their own.
    pub fn assign_role(
        &self,
        user: UserId,
        target: UserId,
        collection: CollectionId,
        role: RoleId,
    ) -> Result<()> {
        self.check(user, collection, Permission::ManagePermissions)?;

        let updated = {
            let access = self.access.read().map_err(|_| poisoned("access table"))?;
            if access.role(role).is_none() {
                return Err(NotFoundError::Role(role).into());
            }
            let mut record = access
                .user(target)
                .cloned()
                .ok_or(NotFoundError::User(target))?;
            record.roles.insert(collection, role);
            record
        };
        self.storage.save_user(&updated)?;
        self.access
            .write()
            .map_err(|_| poisoned("access table"))?
            .insert_user(updated);

        info!(target = %target, collection = %collection, role = %role, "Role assigned");
        Ok(())
    }

    /// Removes `target`'s role for `collection`. Requires
    /// `manage_permissions` for that collection.
    pub fn revoke_role(
        &self,
        user: UserId,
        target: UserId,
        collection: CollectionId,
    ) -> Result<()> {
        self.check(user, collection, Permission::ManagePermissions)?;

        let updated = {
            let access = self.access.read().map_err(|_| poisoned("access table"))?;
            let mut record = access
                .user(target)
                .cloned()
                .ok_or(NotFoundError::User(target))?;
            record.roles.remove(&collection);
            record
        };
        self.storage.save_user(&updated)?;
        self.access
            .write()
            .map_err(|_| poisoned("access table"))?
            .insert_user(updated);

        info!(target = %target, collection = %collection, "Role revoked");
        Ok(())
    }

    /// Lists all roles. Requires `manage_permissions` at the
    /// database-wide scope.
    pub fn list_roles(&self, user: UserId) -> Result<Vec<Role>> {
        self.check(user, CollectionId::ADMIN_SCOPE, Permission::ManagePermissions)?;
        let access = self.access.read().map_err(|_| poisoned("access table"))?;
        Ok(access.roles().cloned().collect())
    }

    /// Lists all users. Requires `manage_permissions` at the
    /// database-wide scope.
    pub fn list_users(&self, user: UserId) -> Result<Vec<User>> {
        self.check(user, CollectionId::ADMIN_SCOPE, Permission::ManagePermissions)?;
        let access = self.access.read().map_err(|_| poisoned("access table"))?;
        Ok(access.users().cloned().collect())
    }
}

// TrellisDb is auto Send + Sync: Box<dyn StorageEngine> is Send + Sync by
// trait bound, and the registries sit behind std sync primitives.

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_seeds_root_and_admin() {
        let dir = tempdir().unwrap();
        let db = TrellisDb::open(dir.path().join("test.db"), Config::default()).unwrap();

        let root = db.user_id(ROOT_USERNAME).expect("root seeded");
        let roles = db.list_roles(root).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, ADMIN_ROLE_NAME);
        assert_eq!(roles[0].permissions, PermissionSet::all());
        assert_eq!(db.credential_hash(ROOT_USERNAME).as_deref(), Some(""));

        db.close().unwrap();
    }

    #[test]
    fn test_seeding_happens_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let db = TrellisDb::open(&path, Config::default()).unwrap();
        let root = db.user_id(ROOT_USERNAME).unwrap();
        db.create_user(root, "alice", "hash").unwrap();
        db.close().unwrap();

        let db = TrellisDb::open(&path, Config::default()).unwrap();
        let root = db.user_id(ROOT_USERNAME).unwrap();
        assert_eq!(db.list_users(root).unwrap().len(), 2);
        assert_eq!(db.list_roles(root).unwrap().len(), 1);
        db.close().unwrap();
    }

    #[test]
    fn test_trellisdb_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TrellisDb>();
    }

    #[test]
    fn test_config_validation_on_open() {
        let dir = tempdir().unwrap();
        let config = Config {
            cache_size_mb: 0,
            ..Default::default()
        };
        assert!(TrellisDb::open(dir.path().join("test.db"), config).is_err());
    }
}
