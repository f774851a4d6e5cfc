use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::infra::cache::UserCacheBackend;
use crate::infra::db::{DbRoleRepository, DbUserRepository};
use crate::infra::hasher::Argon2Hasher;
use crate::usecase::account::AccountService;

pub type Accounts =
    AccountService<DbUserRepository, DbRoleRepository, UserCacheBackend, Argon2Hasher>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub accounts: Arc<Accounts>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, cache: UserCacheBackend) -> Self {
        let accounts = AccountService::new(
            DbUserRepository { db: db.clone() },
            DbRoleRepository { db: db.clone() },
            cache,
            Argon2Hasher::default(),
        );
        Self {
            db,
            accounts: Arc::new(accounts),
        }
    }
}
