#![allow(async_fn_in_trait)]

use std::collections::BTreeSet;

use keystone_domain::id::{RoleId, UserId};
use keystone_domain::pagination::{Page, PageRequest};

use crate::domain::filter::{PredicateSet, SortSpec};
use crate::domain::types::{Role, User};
use crate::domain::view::UserView;
use crate::error::AccountsError;

/// Identity store for user records and their role membership edges.
///
/// Username and email lookups ignore letter case.
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AccountsError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AccountsError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountsError>;
    async fn exists_by_username(&self, username: &str) -> Result<bool, AccountsError>;
    async fn exists_by_email(&self, email: &str) -> Result<bool, AccountsError>;

    /// Insert or update the user and replace its role edges with `user.role_ids`.
    /// A uniqueness violation surfaces as the matching `*AlreadyExists` error.
    async fn save(&self, user: &User) -> Result<(), AccountsError>;

    /// Delete the user and its role edges. Returns `true` if a row was deleted.
    async fn delete_by_id(&self, id: UserId) -> Result<bool, AccountsError>;

    async fn find_all(
        &self,
        predicates: &PredicateSet,
        page: PageRequest,
        sort: SortSpec,
    ) -> Result<Page<User>, AccountsError>;
}

/// Read-only access to pre-seeded roles, loaded together with their permissions.
pub trait RoleRepository: Send + Sync {
    /// Case-insensitive name lookup.
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AccountsError>;
    /// Unknown ids are skipped.
    async fn find_by_ids(&self, ids: &BTreeSet<RoleId>) -> Result<Vec<Role>, AccountsError>;
}

/// One-way secret hashing.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, AccountsError>;
    fn verify(&self, plaintext: &str, digest: &str) -> Result<bool, AccountsError>;
}

/// Projection cache keyed by user id. Expiry is up to the backend.
pub trait UserCache: Send + Sync {
    async fn get(&self, id: UserId) -> Result<Option<UserView>, AccountsError>;
    async fn put(&self, view: &UserView) -> Result<(), AccountsError>;
    async fn evict(&self, id: UserId) -> Result<(), AccountsError>;
}
