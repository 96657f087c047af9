//! Role-based access control.
//!
//! Every engine operation resolves `(user, collection) → effective role →
//! permission check` before touching any index state. The check is pure
//! lookup over in-memory tables; persistence of users and roles goes
//! through the storage engine.
//!
//! # Resolution
//!
//! A user holds at most one role per collection. The effective role for a
//! collection is the explicit assignment if present, otherwise the user's
//! role at [`CollectionId::ADMIN_SCOPE`] (the database-wide fallback used
//! for collection-independent operations and root access). No role at
//! either scope means every operation on that collection is denied,
//! including read-only queries.
//!
//! Authentication is a precondition external to this module: the caller
//! verifies credentials against the stored hash and hands an
//! already-authenticated [`UserId`] to the engine.

pub mod permission;

pub use permission::{Permission, PermissionSet, Role};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{NotFoundError, Result, TrellisError};
use crate::types::{CollectionId, RoleId, Timestamp, UserId};

/// A user record: identity, opaque credential hash, and per-collection
/// role assignments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: UserId,
    /// Username, unique.
    pub username: String,
    /// Opaque credential hash. Verification is the caller's concern;
    /// the engine never interprets this value.
    pub credential_hash: String,
    /// Collection id → role id. At most one role per collection.
    pub roles: BTreeMap<CollectionId, RoleId>,
    /// When the user was created.
    pub created_at: Timestamp,
}

impl User {
    /// Creates a user with no role assignments.
    pub fn new(id: UserId, username: impl Into<String>, credential_hash: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            credential_hash: credential_hash.into(),
            roles: BTreeMap::new(),
            created_at: Timestamp::now(),
        }
    }

    /// Returns the role this user holds for the given collection, falling
    /// back to the database-wide scope.
    pub fn role_for(&self, collection: CollectionId) -> Option<RoleId> {
        self.roles
            .get(&collection)
            .or_else(|| self.roles.get(&CollectionId::ADMIN_SCOPE))
            .copied()
    }
}

/// In-memory access-control tables: users and roles by id, plus a
/// username index.
///
/// Kept behind a `RwLock` by the database handle; mutation goes through
/// the handle so storage stays in sync.
#[derive(Debug, Default)]
pub struct AccessState {
    users: BTreeMap<UserId, User>,
    roles: BTreeMap<RoleId, Role>,
    usernames: BTreeMap<String, UserId>,
}

impl AccessState {
    /// Builds the tables from loaded records.
    pub fn from_records(users: Vec<User>, roles: Vec<Role>) -> Self {
        let mut state = Self::default();
        for role in roles {
            state.roles.insert(role.id, role);
        }
        for user in users {
            state.usernames.insert(user.username.clone(), user.id);
            state.users.insert(user.id, user);
        }
        state
    }

    /// The RBAC gate: does `user` hold `permission` for `collection`?
    ///
    /// Deny reasons distinguish an unknown user, a missing role
    /// assignment, and a role that lacks the permission. Allow returns
    /// `Ok(())` so callers can gate with `?` and short-circuit before any
    /// side effect.
    pub fn check(
        &self,
        user: UserId,
        collection: CollectionId,
        permission: Permission,
    ) -> Result<()> {
        let record = self
            .users
            .get(&user)
            .ok_or(NotFoundError::User(user))?;

        let role_id = record.role_for(collection).ok_or_else(|| {
            TrellisError::permission_denied(format!(
                "user '{}' has no role assigned for collection {}",
                record.username, collection
            ))
        })?;

        let role = self.roles.get(&role_id).ok_or_else(|| {
            // Dangling assignment; treat as no grant rather than a 500.
            TrellisError::permission_denied(format!(
                "user '{}' is assigned unknown role {} for collection {}",
                record.username, role_id, collection
            ))
        })?;

        if role.permissions.allows(permission) {
            Ok(())
        } else {
            Err(TrellisError::permission_denied(format!(
                "role '{}' lacks permission {}",
                role.name, permission
            )))
        }
    }

    /// Returns the user with the given id.
    pub fn user(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    /// Returns the user with the given username.
    pub fn user_by_name(&self, username: &str) -> Option<&User> {
        self.usernames
            .get(username)
            .and_then(|id| self.users.get(id))
    }

    /// Returns the role with the given id.
    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.get(&id)
    }

    /// Returns all users, ordered by id.
    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    /// Returns all roles, ordered by id.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }

    /// Returns true if a role with the given name exists.
    pub fn role_name_taken(&self, name: &str) -> bool {
        self.roles.values().any(|role| role.name == name)
    }

    /// Inserts a role.
    pub fn insert_role(&mut self, role: Role) {
        self.roles.insert(role.id, role);
    }

    /// Inserts a user, indexing the username.
    pub fn insert_user(&mut self, user: User) {
        self.usernames.insert(user.username.clone(), user.id);
        self.users.insert(user.id, user);
    }

    /// Strips assignments for a deleted collection from every user.
    /// Returns the users that changed, for persistence.
    pub fn forget_collection(&mut self, collection: CollectionId) -> Vec<User> {
        let mut changed = Vec::new();
        for record in self.users.values_mut() {
            if record.roles.remove(&collection).is_some() {
                changed.push(record.clone());
            }
        }
        changed
    }
}
