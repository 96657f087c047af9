//! The permission model: a closed enumeration of capabilities and the
//! bit-set used for O(1) membership checks.
//!
//! Roles carry a [`PermissionSet`]; the authorizer answers
//! "does this role contain this [`Permission`]" with a single bit test.
//! The enumeration is closed: adding a capability is a schema-level
//! change, not runtime data.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{RoleId, Timestamp};

/// A single capability that can be granted through a role.
///
/// Spans collection, index, vector, query, version, and admin management
/// actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// List collections and read collection descriptors.
    ListCollections,
    /// Create a new collection.
    CreateCollection,
    /// Delete a collection and everything attached to it.
    DeleteCollection,
    /// Attach a dense, sparse, or TF-IDF index to a collection.
    CreateIndex,
    /// Detach an index from a collection.
    DeleteIndex,
    /// Stage vector Create operations.
    CreateVectors,
    /// Stage vector Upsert operations.
    UpsertVectors,
    /// Stage vector Delete operations.
    DeleteVectors,
    /// Read committed vectors by id.
    GetVectors,
    /// Run similarity searches.
    QueryVectors,
    /// Open, commit, and abort transactions.
    CreateTransaction,
    /// List collection versions.
    ListVersions,
    /// Manage collection versions.
    ManageVersions,
    /// Administer roles, users, and role assignments.
    ManagePermissions,
}

impl Permission {
    /// Returns the bitflag for this permission.
    pub const fn as_set(self) -> PermissionSet {
        match self {
            Self::ListCollections => PermissionSet::LIST_COLLECTIONS,
            Self::CreateCollection => PermissionSet::CREATE_COLLECTION,
            Self::DeleteCollection => PermissionSet::DELETE_COLLECTION,
            Self::CreateIndex => PermissionSet::CREATE_INDEX,
            Self::DeleteIndex => PermissionSet::DELETE_INDEX,
            Self::CreateVectors => PermissionSet::CREATE_VECTORS,
            Self::UpsertVectors => PermissionSet::UPSERT_VECTORS,
            Self::DeleteVectors => PermissionSet::DELETE_VECTORS,
            Self::GetVectors => PermissionSet::GET_VECTORS,
            Self::QueryVectors => PermissionSet::QUERY_VECTORS,
            Self::CreateTransaction => PermissionSet::CREATE_TRANSACTION,
            Self::ListVersions => PermissionSet::LIST_VERSIONS,
            Self::ManageVersions => PermissionSet::MANAGE_VERSIONS,
            Self::ManagePermissions => PermissionSet::MANAGE_PERMISSIONS,
        }
    }

    /// Returns the snake_case name used in deny reasons and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListCollections => "list_collections",
            Self::CreateCollection => "create_collection",
            Self::DeleteCollection => "delete_collection",
            Self::CreateIndex => "create_index",
            Self::DeleteIndex => "delete_index",
            Self::CreateVectors => "create_vectors",
            Self::UpsertVectors => "upsert_vectors",
            Self::DeleteVectors => "delete_vectors",
            Self::GetVectors => "get_vectors",
            Self::QueryVectors => "query_vectors",
            Self::CreateTransaction => "create_transaction",
            Self::ListVersions => "list_versions",
            Self::ManageVersions => "manage_versions",
            Self::ManagePermissions => "manage_permissions",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Permission> for PermissionSet {
    fn from(permission: Permission) -> Self {
        permission.as_set()
    }
}

bitflags::bitflags! {
    /// A set of permissions, one bit per [`Permission`] variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PermissionSet: u32 {
        /// List collections and read collection descriptors.
        const LIST_COLLECTIONS = 1 << 0;
        /// Create a new collection.
        const CREATE_COLLECTION = 1 << 1;
        /// Delete a collection.
        const DELETE_COLLECTION = 1 << 2;
        /// Attach an index.
        const CREATE_INDEX = 1 << 3;
        /// Detach an index.
        const DELETE_INDEX = 1 << 4;
        /// Stage vector Create operations.
        const CREATE_VECTORS = 1 << 5;
        /// Stage vector Upsert operations.
        const UPSERT_VECTORS = 1 << 6;
        /// Stage vector Delete operations.
        const DELETE_VECTORS = 1 << 7;
        /// Read committed vectors by id.
        const GET_VECTORS = 1 << 8;
        /// Run similarity searches.
        const QUERY_VECTORS = 1 << 9;
        /// Open, commit, and abort transactions.
        const CREATE_TRANSACTION = 1 << 10;
        /// List collection versions.
        const LIST_VERSIONS = 1 << 11;
        /// Manage collection versions.
        const MANAGE_VERSIONS = 1 << 12;
        /// Administer roles, users, and role assignments.
        const MANAGE_PERMISSIONS = 1 << 13;
    }
}

impl PermissionSet {
    /// The read-only grant: list, point reads, and searches.
    pub fn reader() -> Self {
        Self::LIST_COLLECTIONS | Self::GET_VECTORS | Self::QUERY_VECTORS
    }

    /// The read-write grant: everything a reader has plus vector
    /// mutations through transactions.
    pub fn writer() -> Self {
        Self::reader()
            | Self::CREATE_VECTORS
            | Self::UPSERT_VECTORS
            | Self::DELETE_VECTORS
            | Self::CREATE_TRANSACTION
    }

    /// Returns true if the set contains the given permission.
    #[inline]
    pub fn allows(&self, permission: Permission) -> bool {
        self.contains(permission.as_set())
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = PermissionSet::empty();
        for permission in iter {
            set |= permission.as_set();
        }
        set
    }
}

// bitflags doesn't derive serde; persist the raw bits. Unknown bits from
// a newer schema are dropped on load rather than rejected.
impl Serialize for PermissionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for PermissionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bits = u32::deserialize(deserializer)?;
        Ok(PermissionSet::from_bits_truncate(bits))
    }
}

/// A named set of permissions.
///
/// Roles are global entities; a user is assigned at most one role per
/// collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Role id.
    pub id: RoleId,
    /// Human-readable role name, unique.
    pub name: String,
    /// The permissions this role grants.
    pub permissions: PermissionSet,
    /// When the role was created.
    pub created_at: Timestamp,
}

impl Role {
    /// Creates a role with the given id, name, and permission set.
    pub fn new(id: RoleId, name: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            id,
            name: name.into(),
            permissions,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_bit_mapping_is_unique() {
        let all = [
            Permission::ListCollections,
            Permission::CreateCollection,
            Permission::DeleteCollection,
            Permission::CreateIndex,
            Permission::DeleteIndex,
            Permission::CreateVectors,
            Permission::UpsertVectors,
            Permission::DeleteVectors,
            Permission::GetVectors,
            Permission::QueryVectors,
            Permission::CreateTransaction,
            Permission::ListVersions,
            Permission::ManageVersions,
            Permission::ManagePermissions,
        ];
        let combined: PermissionSet = all.into_iter().collect();
        assert_eq!(combined.bits().count_ones() as usize, all.len());
        assert_eq!(combined, PermissionSet::all());
    }

    #[test]
    fn test_allows() {
        let set = PermissionSet::reader();
        assert!(set.allows(Permission::QueryVectors));
        assert!(set.allows(Permission::GetVectors));
        assert!(!set.allows(Permission::UpsertVectors));
        assert!(!set.allows(Permission::ManagePermissions));
    }

    #[test]
    fn test_writer_extends_reader() {
        let writer = PermissionSet::writer();
        assert!(writer.contains(PermissionSet::reader()));
        assert!(writer.allows(Permission::CreateTransaction));
        assert!(writer.allows(Permission::DeleteVectors));
        assert!(!writer.allows(Permission::DeleteCollection));
    }

    #[test]
    fn test_permission_set_serde_roundtrip() {
        let set = PermissionSet::writer();
        let bytes = bincode::serialize(&set).unwrap();
        let restored: PermissionSet = bincode::deserialize(&bytes).unwrap();
        assert_eq!(set, restored);
    }

    #[test]
    fn test_unknown_bits_dropped_on_load() {
        let bytes = bincode::serialize(&u32::MAX).unwrap();
        let restored: PermissionSet = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, PermissionSet::all());
    }

    #[test]
    fn test_role_serialization() {
        let role = Role::new(RoleId(1), "writer", PermissionSet::writer());
        let bytes = bincode::serialize(&role).unwrap();
        let restored: Role = bincode::deserialize(&bytes).unwrap();
        assert_eq!(role, restored);
    }

    #[test]
    fn test_permission_display() {
        assert_eq!(Permission::UpsertVectors.to_string(), "upsert_vectors");
        assert_eq!(
            Permission::ManagePermissions.to_string(),
            "manage_permissions"
        );
    }
}
