use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use deadpool_redis::Pool;
use deadpool_redis::redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use keystone_domain::id::UserId;

use crate::domain::repository::UserCache;
use crate::domain::view::UserView;
use crate::error::AccountsError;

fn user_key(id: UserId) -> String {
    format!("users:{id}")
}

// ── Redis ────────────────────────────────────────────────────────────────────

/// Redis payload. `UserView` writes timestamps to the millisecond, so the
/// exact instants are stored alongside and restored on decode.
#[derive(Serialize, Deserialize)]
struct CachedView {
    view: UserView,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn encode(view: &UserView) -> Result<Vec<u8>, AccountsError> {
    let entry = CachedView {
        view: view.clone(),
        created_at: view.created_at,
        updated_at: view.updated_at,
    };
    serde_json::to_vec(&entry).map_err(|e| AccountsError::Internal(e.into()))
}

fn decode(bytes: &[u8]) -> Result<UserView, AccountsError> {
    let CachedView {
        mut view,
        created_at,
        updated_at,
    } = serde_json::from_slice(bytes).map_err(|e| AccountsError::Internal(e.into()))?;
    view.created_at = created_at;
    view.updated_at = updated_at;
    Ok(view)
}

/// Shared cache. Entries are JSON views that expire after `ttl_secs`.
#[derive(Clone)]
pub struct RedisUserCache {
    pub pool: Pool,
    pub ttl_secs: u64,
}

impl UserCache for RedisUserCache {
    async fn get(&self, id: UserId) -> Result<Option<UserView>, AccountsError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AccountsError::Unavailable(e.into()))?;
        let value: Option<Vec<u8>> = conn
            .get(user_key(id))
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| AccountsError::Unavailable(e.into()))?;
        value.map(|bytes| decode(&bytes)).transpose()
    }

    async fn put(&self, view: &UserView) -> Result<(), AccountsError> {
        let json = encode(view)?;
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AccountsError::Unavailable(e.into()))?;
        let (): () = conn
            .set_ex(user_key(view.id), json, self.ttl_secs)
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| AccountsError::Unavailable(e.into()))?;
        Ok(())
    }

    async fn evict(&self, id: UserId) -> Result<(), AccountsError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| AccountsError::Unavailable(e.into()))?;
        let _: u64 = conn
            .del(user_key(id))
            .await
            .map_err(|e: deadpool_redis::redis::RedisError| AccountsError::Unavailable(e.into()))?;
        Ok(())
    }
}

// ── In-process ───────────────────────────────────────────────────────────────

/// Per-process cache with no expiry. Entries live until evicted.
#[derive(Clone, Default)]
pub struct LocalUserCache {
    entries: Arc<DashMap<UserId, UserView>>,
}

impl LocalUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UserCache for LocalUserCache {
    async fn get(&self, id: UserId) -> Result<Option<UserView>, AccountsError> {
        Ok(self.entries.get(&id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, view: &UserView) -> Result<(), AccountsError> {
        self.entries.insert(view.id, view.clone());
        Ok(())
    }

    async fn evict(&self, id: UserId) -> Result<(), AccountsError> {
        self.entries.remove(&id);
        Ok(())
    }
}

// ── Selection ────────────────────────────────────────────────────────────────

/// Cache backend chosen at startup.
#[derive(Clone)]
pub enum UserCacheBackend {
    Redis(RedisUserCache),
    Local(LocalUserCache),
}

impl UserCacheBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Local(_) => "local",
        }
    }
}

impl UserCache for UserCacheBackend {
    async fn get(&self, id: UserId) -> Result<Option<UserView>, AccountsError> {
        match self {
            Self::Redis(cache) => cache.get(id).await,
            Self::Local(cache) => cache.get(id).await,
        }
    }

    async fn put(&self, view: &UserView) -> Result<(), AccountsError> {
        match self {
            Self::Redis(cache) => cache.put(view).await,
            Self::Local(cache) => cache.put(view).await,
        }
    }

    async fn evict(&self, id: UserId) -> Result<(), AccountsError> {
        match self {
            Self::Redis(cache) => cache.evict(id).await,
            Self::Local(cache) => cache.evict(id).await,
        }
    }
}
