use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, info, warn};

use keystone_domain::id::{RoleId, UserId};
use keystone_domain::pagination::{Page, PageRequest};

use crate::domain::filter::{PredicateSet, SortSpec, UserSearchFilter};
use crate::domain::repository::{CredentialHasher, RoleRepository, UserCache, UserRepository};
use crate::domain::types::{NewUser, Role, User, UserChanges};
use crate::domain::view::UserView;
use crate::error::AccountsError;

pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub bio: Option<String>,
    /// Matched against existing role names ignoring case.
    pub role_names: Vec<String>,
}

pub struct ChangePasswordInput {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

const GENERATION_SLOTS: usize = 64;

/// Invalidation counters striped by user id. Bumped before every eviction;
/// a cache fill that straddles a bump of its slot is taken back out.
struct Generations {
    slots: [AtomicU64; GENERATION_SLOTS],
}

impl Default for Generations {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl Generations {
    fn slot(&self, id: UserId) -> &AtomicU64 {
        &self.slots[(id.0.as_u128() % GENERATION_SLOTS as u128) as usize]
    }

    fn current(&self, id: UserId) -> u64 {
        self.slot(id).load(Ordering::Acquire)
    }

    fn bump(&self, id: UserId) {
        self.slot(id).fetch_add(1, Ordering::AcqRel);
    }
}

/// Single entry point for account lifecycle and access-control operations.
///
/// `get_by_id` reads through `cache`. Every mutating operation evicts the
/// affected id once the store call has returned, whether it succeeded or not.
pub struct AccountService<U, R, C, H> {
    pub users: U,
    pub roles: R,
    pub cache: C,
    pub hasher: H,
    generations: Generations,
}

impl<U, R, C, H> AccountService<U, R, C, H> {
    pub fn new(users: U, roles: R, cache: C, hasher: H) -> Self {
        Self {
            users,
            roles,
            cache,
            hasher,
            generations: Generations::default(),
        }
    }
}

impl<U, R, C, H> AccountService<U, R, C, H>
where
    U: UserRepository,
    R: RoleRepository,
    C: UserCache,
    H: CredentialHasher,
{
    // ── Create ───────────────────────────────────────────────────────────────

    pub async fn create(&self, input: CreateUserInput) -> Result<UserView, AccountsError> {
        debug!(username = %input.username, "creating user");
        if self.users.exists_by_username(&input.username).await? {
            return Err(AccountsError::UsernameAlreadyExists);
        }
        if self.users.exists_by_email(&input.email).await? {
            return Err(AccountsError::EmailAlreadyExists);
        }

        let mut roles = Vec::with_capacity(input.role_names.len());
        for name in &input.role_names {
            let role = self.require_role(name).await?;
            if !roles.iter().any(|r: &Role| r.id == role.id) {
                roles.push(role);
            }
        }

        let user = User::register(
            NewUser {
                username: input.username,
                email: input.email,
                password_hash: self.hasher.hash(&input.password)?,
                first_name: input.first_name,
                last_name: input.last_name,
                phone_number: input.phone_number,
                bio: input.bio,
                role_ids: roles.iter().map(|r| r.id).collect(),
            },
            Utc::now(),
        );
        self.users.save(&user).await?;
        info!(user_id = %user.id, username = %user.username, "user created");
        Ok(UserView::project(&user, &roles))
    }

    // ── Update ───────────────────────────────────────────────────────────────

    /// Apply the present fields of `changes`. A new email must not belong to
    /// any other user.
    pub async fn update(&self, id: UserId, changes: UserChanges) -> Result<UserView, AccountsError> {
        debug!(user_id = %id, "updating user");
        let result = async {
            let mut user = self.load(id).await?;
            if let Some(email) = changes.email.as_deref() {
                let taken = self.users.find_by_email(email).await?;
                if taken.is_some_and(|other| other.id != id) {
                    return Err(AccountsError::EmailAlreadyExists);
                }
            }
            changes.apply_to(&mut user);
            user.touch(Utc::now());
            self.users.save(&user).await?;
            Ok(user)
        }
        .await;
        let user = self.evict_after(id, result).await?;
        info!(user_id = %id, "user updated");
        self.project(&user).await
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Cached read. Cache failures degrade to a store read.
    pub async fn get_by_id(&self, id: UserId) -> Result<UserView, AccountsError> {
        let generation = self.generations.current(id);
        match self.cache.get(id).await {
            Ok(Some(view)) => {
                debug!(user_id = %id, "user cache hit");
                return Ok(view);
            }
            Ok(None) => debug!(user_id = %id, "user cache miss"),
            Err(e) => warn!(user_id = %id, error = %e, "user cache read failed"),
        }

        let user = self.load(id).await?;
        let view = self.project(&user).await?;
        if let Err(e) = self.cache.put(&view).await {
            warn!(user_id = %id, error = %e, "user cache populate failed");
        } else if self.generations.current(id) != generation {
            debug!(user_id = %id, "user changed during read, dropping cached view");
            if let Err(e) = self.cache.evict(id).await {
                warn!(user_id = %id, error = %e, "user cache eviction failed");
            }
        }
        Ok(view)
    }

    pub async fn get_by_username(&self, username: &str) -> Result<UserView, AccountsError> {
        let user = self
            .users
            .find_by_username(username)
            .await?
            .ok_or(AccountsError::UserNotFound)?;
        self.project(&user).await
    }

    pub async fn get_by_email(&self, email: &str) -> Result<UserView, AccountsError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AccountsError::UserNotFound)?;
        self.project(&user).await
    }

    /// Raw entity including the password hash, for an external authenticator.
    /// Never cached.
    pub async fn find_user_by_username(&self, username: &str) -> Result<User, AccountsError> {
        self.users
            .find_by_username(username)
            .await?
            .ok_or(AccountsError::UserNotFound)
    }

    pub async fn exists_by_username(&self, username: &str) -> Result<bool, AccountsError> {
        self.users.exists_by_username(username).await
    }

    pub async fn exists_by_email(&self, email: &str) -> Result<bool, AccountsError> {
        self.users.exists_by_email(email).await
    }

    // ── Listing ──────────────────────────────────────────────────────────────

    pub async fn list(
        &self,
        page: PageRequest,
        sort: SortSpec,
    ) -> Result<Page<UserView>, AccountsError> {
        self.find_page(PredicateSet::all(), page, sort).await
    }

    pub async fn search(
        &self,
        filter: &UserSearchFilter,
        page: PageRequest,
        sort: SortSpec,
    ) -> Result<Page<UserView>, AccountsError> {
        let predicates = PredicateSet::from_filter(filter)?;
        self.find_page(predicates, page, sort).await
    }

    async fn find_page(
        &self,
        predicates: PredicateSet,
        page: PageRequest,
        sort: SortSpec,
    ) -> Result<Page<UserView>, AccountsError> {
        let page = page.validated()?;
        debug!(
            predicates = predicates.predicates().len(),
            page = page.page,
            size = page.size,
            "finding users"
        );
        let users = self.users.find_all(&predicates, page, sort).await?;

        let role_ids: BTreeSet<RoleId> = users
            .content
            .iter()
            .flat_map(|u| u.role_ids.iter().copied())
            .collect();
        let roles: HashMap<RoleId, Role> = self
            .roles
            .find_by_ids(&role_ids)
            .await?
            .into_iter()
            .map(|role| (role.id, role))
            .collect();

        Ok(users.map(|user| {
            let held: Vec<Role> = user
                .role_ids
                .iter()
                .filter_map(|id| roles.get(id).cloned())
                .collect();
            UserView::project(&user, &held)
        }))
    }

    // ── Delete ───────────────────────────────────────────────────────────────

    pub async fn delete(&self, id: UserId) -> Result<(), AccountsError> {
        let result = self.users.delete_by_id(id).await;
        let deleted = self.evict_after(id, result).await?;
        if !deleted {
            return Err(AccountsError::UserNotFound);
        }
        info!(user_id = %id, "user deleted");
        Ok(())
    }

    // ── Credentials ──────────────────────────────────────────────────────────

    /// Confirmation is checked before the current password, so a mismatch
    /// never costs a hash verification.
    pub async fn change_password(
        &self,
        id: UserId,
        input: ChangePasswordInput,
    ) -> Result<(), AccountsError> {
        if input.new_password != input.confirm_password {
            return Err(AccountsError::Validation(
                "new password and confirmation do not match".to_owned(),
            ));
        }
        self.mutate(id, |user| {
            if !self
                .hasher
                .verify(&input.current_password, &user.password_hash)?
            {
                return Err(AccountsError::InvalidCredential);
            }
            user.password_hash = self.hasher.hash(&input.new_password)?;
            Ok(())
        })
        .await?;
        info!(user_id = %id, "password changed");
        Ok(())
    }

    // ── Account state ────────────────────────────────────────────────────────

    pub async fn lock(&self, id: UserId) -> Result<UserView, AccountsError> {
        let user = self.transition(id, User::lock).await?;
        info!(user_id = %id, "account locked");
        self.project(&user).await
    }

    pub async fn unlock(&self, id: UserId) -> Result<UserView, AccountsError> {
        let user = self.transition(id, User::unlock).await?;
        info!(user_id = %id, "account unlocked");
        self.project(&user).await
    }

    pub async fn verify_email(&self, id: UserId) -> Result<UserView, AccountsError> {
        let user = self.transition(id, User::verify_email).await?;
        info!(user_id = %id, "email verified");
        self.project(&user).await
    }

    /// Count one failed authentication. The fifth consecutive failure locks
    /// the account.
    pub async fn record_failed_login(&self, id: UserId) -> Result<UserView, AccountsError> {
        let user = self.transition(id, User::increment_failed_login).await?;
        if user.account_locked {
            info!(
                user_id = %id,
                attempts = user.failed_login_attempts,
                "failed login recorded, account locked"
            );
        } else {
            debug!(user_id = %id, attempts = user.failed_login_attempts, "failed login recorded");
        }
        self.project(&user).await
    }

    pub async fn reset_failed_logins(&self, id: UserId) -> Result<UserView, AccountsError> {
        let user = self.transition(id, User::reset_failed_login_attempts).await?;
        debug!(user_id = %id, "failed login counter reset");
        self.project(&user).await
    }

    // ── Roles ────────────────────────────────────────────────────────────────

    pub async fn add_role_to_user(
        &self,
        id: UserId,
        role_name: &str,
    ) -> Result<UserView, AccountsError> {
        let (user, role) = self.edit_roles(id, role_name, User::add_role).await?;
        info!(user_id = %id, role = %role.name, "role added");
        self.project(&user).await
    }

    pub async fn remove_role_from_user(
        &self,
        id: UserId,
        role_name: &str,
    ) -> Result<UserView, AccountsError> {
        let (user, role) = self.edit_roles(id, role_name, User::remove_role).await?;
        info!(user_id = %id, role = %role.name, "role removed");
        self.project(&user).await
    }

    /// Exact, case-sensitive role name check.
    pub async fn has_role(&self, id: UserId, role_name: &str) -> Result<bool, AccountsError> {
        Ok(self.get_by_id(id).await?.has_role(role_name))
    }

    /// Exact, case-sensitive check against the effective permission set.
    pub async fn has_permission(
        &self,
        id: UserId,
        permission_name: &str,
    ) -> Result<bool, AccountsError> {
        Ok(self.get_by_id(id).await?.has_permission(permission_name))
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    async fn load(&self, id: UserId) -> Result<User, AccountsError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or(AccountsError::UserNotFound)
    }

    async fn require_role(&self, name: &str) -> Result<Role, AccountsError> {
        self.roles
            .find_by_name(name)
            .await?
            .ok_or_else(|| AccountsError::RoleNotFound(name.to_owned()))
    }

    async fn project(&self, user: &User) -> Result<UserView, AccountsError> {
        let roles = self.roles.find_by_ids(&user.role_ids).await?;
        Ok(UserView::project(user, &roles))
    }

    async fn transition(&self, id: UserId, apply: fn(&mut User)) -> Result<User, AccountsError> {
        self.mutate(id, |user| {
            apply(user);
            Ok(())
        })
        .await
    }

    /// Load, modify, persist, then evict.
    async fn mutate<F>(&self, id: UserId, apply: F) -> Result<User, AccountsError>
    where
        F: FnOnce(&mut User) -> Result<(), AccountsError>,
    {
        let result = async {
            let mut user = self.load(id).await?;
            apply(&mut user)?;
            user.touch(Utc::now());
            self.users.save(&user).await?;
            Ok(user)
        }
        .await;
        self.evict_after(id, result).await
    }

    /// The user is resolved before the role, so a missing user wins.
    async fn edit_roles(
        &self,
        id: UserId,
        role_name: &str,
        apply: fn(&mut User, RoleId) -> bool,
    ) -> Result<(User, Role), AccountsError> {
        let result = async {
            let mut user = self.load(id).await?;
            let role = self.require_role(role_name).await?;
            apply(&mut user, role.id);
            user.touch(Utc::now());
            self.users.save(&user).await?;
            Ok((user, role))
        }
        .await;
        self.evict_after(id, result).await
    }

    /// Evict `id` after a store call has returned. The operation's own error
    /// takes precedence over an eviction failure.
    async fn evict_after<T>(
        &self,
        id: UserId,
        result: Result<T, AccountsError>,
    ) -> Result<T, AccountsError> {
        self.generations.bump(id);
        let evicted = self.cache.evict(id).await;
        match (result, evicted) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                warn!(user_id = %id, error = %e, "user cache eviction failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(evict_err)) => {
                warn!(user_id = %id, error = %evict_err, "user cache eviction failed");
                Err(e)
            }
        }
    }
}
