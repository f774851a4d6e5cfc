use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use keystone_domain::id::{PermissionId, RoleId, UserId};
use keystone_domain::user::UserStatus;

/// Failed login attempts at which an account locks itself.
pub const MAX_FAILED_LOGIN_ATTEMPTS: u32 = 5;

/// Account record. Created and mutated only through the account service.
///
/// The user owns its role membership edges (`role_ids`); the reverse lookup
/// (role → members) is an index maintained by the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub email_verified: bool,
    pub failed_login_attempts: u32,
    pub account_locked: bool,
    pub role_ids: BTreeSet<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to register a new account. The secret is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub role_ids: BTreeSet<RoleId>,
}

impl User {
    /// Build a fresh account in its initial state: active, unlocked,
    /// unverified, no failed attempts.
    pub fn register(new: NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id: UserId::generate(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            phone_number: new.phone_number,
            bio: new.bio,
            avatar_url: None,
            status: UserStatus::Active,
            email_verified: false,
            failed_login_attempts: 0,
            account_locked: false,
            role_ids: new.role_ids,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }

    // ── Account state machine ────────────────────────────────────────────────

    /// Count a failed login. Reaching the threshold locks the account; further
    /// increments keep counting but leave the state untouched.
    pub fn increment_failed_login(&mut self) {
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
        if self.failed_login_attempts >= MAX_FAILED_LOGIN_ATTEMPTS {
            self.lock();
        }
    }

    pub fn lock(&mut self) {
        self.account_locked = true;
        self.status = UserStatus::Locked;
    }

    /// The only transition that clears the failed-attempt counter together
    /// with the lock.
    pub fn unlock(&mut self) {
        self.account_locked = false;
        self.failed_login_attempts = 0;
        self.status = UserStatus::Active;
    }

    pub fn reset_failed_login_attempts(&mut self) {
        self.failed_login_attempts = 0;
    }

    pub fn verify_email(&mut self) {
        self.email_verified = true;
    }

    // ── Role membership ──────────────────────────────────────────────────────

    /// Returns `true` if the edge was added.
    pub fn add_role(&mut self, role_id: RoleId) -> bool {
        self.role_ids.insert(role_id)
    }

    /// Returns `true` if the edge existed.
    pub fn remove_role(&mut self, role_id: RoleId) -> bool {
        self.role_ids.remove(&role_id)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Named grouping of permissions. The role owns its permission grants, which
/// the identity store loads together with the role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
}

/// Atomic capability on a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
    pub resource: String,
    pub action: String,
}

impl Permission {
    /// `resource:action`
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }
}

/// Partial update: `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone_number.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }

    /// Apply every present field. Email uniqueness is checked by the caller.
    pub fn apply_to(self, user: &mut User) {
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            user.last_name = last_name;
        }
        if let Some(phone_number) = self.phone_number {
            user.phone_number = Some(phone_number);
        }
        if let Some(bio) = self.bio {
            user.bio = Some(bio);
        }
        if let Some(avatar_url) = self.avatar_url {
            user.avatar_url = Some(avatar_url);
        }
    }
}
