use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use keystone_core::serde::to_rfc3339_ms;
use keystone_domain::id::UserId;
use keystone_domain::user::UserStatus;

use crate::domain::rbac;
use crate::domain::types::{Role, User};

/// Read projection of a user. This is what callers and the cache see; the
/// password hash never leaves the service through it.
///
/// `full_name`, `roles` and `permissions` are derived from the user and the
/// roles loaded with it every time a view is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub email_verified: bool,
    pub account_locked: bool,
    pub failed_login_attempts: u32,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub updated_at: DateTime<Utc>,
}

impl UserView {
    /// `roles` must be the roles referenced by `user.role_ids`.
    pub fn project(user: &User, roles: &[Role]) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            full_name: user.full_name(),
            phone_number: user.phone_number.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            status: user.status,
            email_verified: user.email_verified,
            account_locked: user.account_locked,
            failed_login_attempts: user.failed_login_attempts,
            roles: rbac::role_names(roles),
            permissions: rbac::effective_permissions(roles),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }

    /// Exact, case-sensitive role name check.
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }

    /// Exact, case-sensitive check against the effective permission set.
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }
}
