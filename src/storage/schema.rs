//! Database schema definitions and versioning.
//!
//! This module defines the table structure for the redb storage engine.
//! All table definitions are compile-time constants to ensure consistency.
//!
//! # Schema Versioning
//!
//! The schema version is stored in the metadata table. When opening an
//! existing database, we check the version and fail if it doesn't match.
//! Migration support will be added in a future release.
//!
//! # Table Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ METADATA_TABLE                                              │
//! │   Key: &str                                                 │
//! │   Value: &[u8] (bincode)                                    │
//! │   Entries: "db_metadata" -> DatabaseMetadata                │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ COLLECTIONS_TABLE  / USERS_TABLE / ROLES_TABLE              │
//! │   Key: u64 (entity id)                                      │
//! │   Value: &[u8] (bincode-serialized record)                  │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ VECTORS_TABLE                                               │
//! │   Key: (u64, u64) — (collection id, vector id)              │
//! │   Value: &[u8] (bincode-serialized VectorRecord)            │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │ COUNTERS_TABLE                                              │
//! │   Key: &str (counter name, e.g. "collection", "txn:3")      │
//! │   Value: u64 (last issued id)                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use redb::TableDefinition;
use serde::{Deserialize, Serialize};

use crate::types::{CollectionId, Timestamp};

/// Current schema version.
///
/// Increment this when making breaking changes to the schema.
/// The database will refuse to open if versions don't match.
pub const SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Table Definitions
// ============================================================================

/// Metadata table for database-level information.
pub const METADATA_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

/// Collection descriptors (config and attached index configs).
pub const COLLECTIONS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("collections");

/// Committed vector records, keyed by (collection id, vector id).
///
/// The composite key keeps one collection's vectors contiguous so a
/// collection load or cascade delete is a single range scan.
pub const VECTORS_TABLE: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("vectors");

/// User records, including per-collection role assignments.
pub const USERS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Role records (name plus permission bit-set).
pub const ROLES_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("roles");

/// Monotonic id allocators, one entry per entity kind.
///
/// The stored value is the last issued id; allocation increments and
/// persists in the same write transaction, so a reopened database resumes
/// from where it left off.
pub const COUNTERS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("counters");

// ============================================================================
// Counter Keys
// ============================================================================

/// Counter key for collection ids.
pub const COUNTER_COLLECTION: &str = "collection";

/// Counter key for user ids.
pub const COUNTER_USER: &str = "user";

/// Counter key for role ids.
pub const COUNTER_ROLE: &str = "role";

/// Counter key for a collection's transaction id sequence.
pub fn transaction_counter_key(collection: CollectionId) -> String {
    format!("txn:{}", collection.0)
}

// ============================================================================
// Database Metadata
// ============================================================================

/// Database metadata stored in the metadata table.
///
/// This is serialized with bincode and stored under the key "db_metadata".
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseMetadata {
    /// Schema version for compatibility checking.
    pub schema_version: u32,

    /// Timestamp when the database was created.
    pub created_at: Timestamp,

    /// Last time the database was opened (updated on each open).
    pub last_opened_at: Timestamp,
}

impl DatabaseMetadata {
    /// Creates new metadata for a fresh database.
    pub fn new() -> Self {
        let now = Timestamp::now();
        Self {
            schema_version: SCHEMA_VERSION,
            created_at: now,
            last_opened_at: now,
        }
    }

    /// Updates the last_opened_at timestamp.
    pub fn touch(&mut self) {
        self.last_opened_at = Timestamp::now();
    }

    /// Checks if this metadata is compatible with the current schema.
    pub fn is_compatible(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }
}

impl Default for DatabaseMetadata {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Key Encoding Helpers
// ============================================================================

/// Full key range covering every vector of one collection.
#[inline]
pub fn vector_range(collection: CollectionId) -> std::ops::RangeInclusive<(u64, u64)> {
    (collection.0, u64::MIN)..=(collection.0, u64::MAX)
}
