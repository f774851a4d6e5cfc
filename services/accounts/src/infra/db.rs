use std::collections::{BTreeSet, HashMap};

use anyhow::anyhow;
use sea_orm::sea_query::{Expr, OnConflict, Query, SimpleExpr};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, Select, SqlErr, TransactionTrait,
};

use keystone_core::sea_ext::{lower_contains, lower_eq};
use keystone_accounts_schema::{permissions, roles, user_roles, users};
use keystone_domain::id::{PermissionId, RoleId, UserId};
use keystone_domain::pagination::{Page, PageRequest, Sort};

use crate::domain::filter::{
    Condition as FieldCondition, Field, Operator, Predicate, PredicateSet, SortField, SortSpec,
    Value,
};
use crate::domain::repository::{RoleRepository, UserRepository};
use crate::domain::types::{Permission, Role, User};
use crate::error::AccountsError;

// ── Error mapping ────────────────────────────────────────────────────────────

/// Connection failures become `Unavailable`, unique violations become the
/// matching conflict, the rest is `Internal`.
fn db_err(context: &'static str) -> impl FnOnce(DbErr) -> AccountsError {
    move |e| {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = e.sql_err() {
            return unique_violation(&detail);
        }
        match e {
            DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => {
                AccountsError::Unavailable(anyhow::Error::new(e).context(context))
            }
            _ => AccountsError::Internal(anyhow::Error::new(e).context(context)),
        }
    }
}

// Constraint names come from the case-insensitive unique indexes.
fn unique_violation(detail: &str) -> AccountsError {
    if detail.contains("email") {
        AccountsError::EmailAlreadyExists
    } else {
        AccountsError::UsernameAlreadyExists
    }
}

// ── User repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl DbUserRepository {
    async fn role_ids_of(
        &self,
        user_ids: &[uuid::Uuid],
    ) -> Result<HashMap<uuid::Uuid, BTreeSet<RoleId>>, AccountsError> {
        let mut edges: HashMap<uuid::Uuid, BTreeSet<RoleId>> = HashMap::new();
        if user_ids.is_empty() {
            return Ok(edges);
        }
        let rows = user_roles::Entity::find()
            .filter(user_roles::Column::UserId.is_in(user_ids.iter().copied()))
            .all(&self.db)
            .await
            .map_err(db_err("load user role edges"))?;
        for row in rows {
            edges
                .entry(row.user_id)
                .or_default()
                .insert(RoleId(row.role_id));
        }
        Ok(edges)
    }

    async fn find_one(&self, query: Select<users::Entity>) -> Result<Option<User>, AccountsError> {
        let Some(model) = query
            .one(&self.db)
            .await
            .map_err(db_err("find user"))?
        else {
            return Ok(None);
        };
        let mut edges = self.role_ids_of(&[model.id]).await?;
        let role_ids = edges.remove(&model.id).unwrap_or_default();
        user_from_model(model, role_ids).map(Some)
    }

    async fn exists(&self, expr: SimpleExpr) -> Result<bool, AccountsError> {
        let count = users::Entity::find()
            .filter(expr)
            .count(&self.db)
            .await
            .map_err(db_err("count users"))?;
        Ok(count > 0)
    }
}

impl UserRepository for DbUserRepository {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, AccountsError> {
        self.find_one(users::Entity::find_by_id(id.0)).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AccountsError> {
        self.find_one(users::Entity::find().filter(lower_eq(users::Column::Username, username)))
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AccountsError> {
        self.find_one(users::Entity::find().filter(lower_eq(users::Column::Email, email)))
            .await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, AccountsError> {
        self.exists(lower_eq(users::Column::Username, username)).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AccountsError> {
        self.exists(lower_eq(users::Column::Email, email)).await
    }

    async fn save(&self, user: &User) -> Result<(), AccountsError> {
        let txn = self.db.begin().await.map_err(db_err("begin save user"))?;

        users::Entity::insert(user_to_active_model(user))
            .on_conflict(
                OnConflict::column(users::Column::Id)
                    .update_columns([
                        users::Column::Email,
                        users::Column::PasswordHash,
                        users::Column::FirstName,
                        users::Column::LastName,
                        users::Column::PhoneNumber,
                        users::Column::Bio,
                        users::Column::AvatarUrl,
                        users::Column::Status,
                        users::Column::EmailVerified,
                        users::Column::FailedLoginAttempts,
                        users::Column::AccountLocked,
                        users::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&txn)
            .await
            .map_err(db_err("upsert user"))?;

        user_roles::Entity::delete_many()
            .filter(user_roles::Column::UserId.eq(user.id.0))
            .exec(&txn)
            .await
            .map_err(db_err("clear user role edges"))?;

        if !user.role_ids.is_empty() {
            user_roles::Entity::insert_many(user.role_ids.iter().map(|role_id| {
                user_roles::ActiveModel {
                    user_id: Set(user.id.0),
                    role_id: Set(role_id.0),
                }
            }))
            .exec(&txn)
            .await
            .map_err(db_err("insert user role edges"))?;
        }

        txn.commit().await.map_err(db_err("commit save user"))?;
        Ok(())
    }

    async fn delete_by_id(&self, id: UserId) -> Result<bool, AccountsError> {
        // Role edges cascade.
        let result = users::Entity::delete_by_id(id.0)
            .exec(&self.db)
            .await
            .map_err(db_err("delete user"))?;
        Ok(result.rows_affected > 0)
    }

    async fn find_all(
        &self,
        predicates: &PredicateSet,
        page: PageRequest,
        sort: SortSpec,
    ) -> Result<Page<User>, AccountsError> {
        let query = ordered(
            users::Entity::find().filter(predicate_condition(predicates)),
            sort,
        );
        let paginator = query.paginate(&self.db, u64::from(page.size));
        let total = paginator
            .num_items()
            .await
            .map_err(db_err("count users"))?;
        let models = paginator
            .fetch_page(u64::from(page.page))
            .await
            .map_err(db_err("fetch users page"))?;

        let ids: Vec<_> = models.iter().map(|m| m.id).collect();
        let mut edges = self.role_ids_of(&ids).await?;
        let content = models
            .into_iter()
            .map(|model| {
                let role_ids = edges.remove(&model.id).unwrap_or_default();
                user_from_model(model, role_ids)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, page, total))
    }
}

fn user_from_model(model: users::Model, role_ids: BTreeSet<RoleId>) -> Result<User, AccountsError> {
    let status = model
        .status
        .parse()
        .map_err(|e| AccountsError::Internal(anyhow!("user {}: {e}", model.id)))?;
    Ok(User {
        id: UserId(model.id),
        username: model.username,
        email: model.email,
        password_hash: model.password_hash,
        first_name: model.first_name,
        last_name: model.last_name,
        phone_number: model.phone_number,
        bio: model.bio,
        avatar_url: model.avatar_url,
        status,
        email_verified: model.email_verified,
        failed_login_attempts: u32::try_from(model.failed_login_attempts).unwrap_or(0),
        account_locked: model.account_locked,
        role_ids,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

fn user_to_active_model(user: &User) -> users::ActiveModel {
    users::ActiveModel {
        id: Set(user.id.0),
        username: Set(user.username.clone()),
        email: Set(user.email.clone()),
        password_hash: Set(user.password_hash.clone()),
        first_name: Set(user.first_name.clone()),
        last_name: Set(user.last_name.clone()),
        phone_number: Set(user.phone_number.clone()),
        bio: Set(user.bio.clone()),
        avatar_url: Set(user.avatar_url.clone()),
        status: Set(user.status.as_str().to_owned()),
        email_verified: Set(user.email_verified),
        failed_login_attempts: Set(i32::try_from(user.failed_login_attempts).unwrap_or(i32::MAX)),
        account_locked: Set(user.account_locked),
        created_at: Set(user.created_at),
        updated_at: Set(user.updated_at),
    }
}

// ── Predicate translation ────────────────────────────────────────────────────

/// Translate a predicate set into a sea-orm condition over `users`.
pub fn predicate_condition(set: &PredicateSet) -> Condition {
    set.predicates()
        .iter()
        .fold(Condition::all(), |all, predicate| match predicate {
            Predicate::Single(condition) => all.add(condition_expr(condition)),
            Predicate::AnyOf(conditions) => all.add(
                conditions
                    .iter()
                    .fold(Condition::any(), |any, c| any.add(condition_expr(c))),
            ),
        })
}

fn text_column(field: Field) -> Option<users::Column> {
    match field {
        Field::FirstName => Some(users::Column::FirstName),
        Field::LastName => Some(users::Column::LastName),
        Field::Username => Some(users::Column::Username),
        Field::Email => Some(users::Column::Email),
        _ => None,
    }
}

fn condition_expr(condition: &FieldCondition) -> SimpleExpr {
    match (condition.field, condition.op, &condition.value) {
        (Field::RoleName, _, Value::Text(name)) => users::Column::Id.in_subquery(
            Query::select()
                .column((user_roles::Entity, user_roles::Column::UserId))
                .from(user_roles::Entity)
                .inner_join(
                    roles::Entity,
                    Expr::col((roles::Entity, roles::Column::Id))
                        .equals((user_roles::Entity, user_roles::Column::RoleId)),
                )
                .and_where(lower_eq((roles::Entity, roles::Column::Name), name))
                .to_owned(),
        ),
        (field, op, Value::Text(text)) => match (text_column(field), op) {
            (Some(col), Operator::Contains) => lower_contains(col, text),
            (Some(col), Operator::EqualsIgnoreCase) => lower_eq(col, text),
            (Some(col), Operator::Equals) => col.eq(text.as_str()),
            _ => never(),
        },
        (Field::Status, Operator::Equals, Value::Status(status)) => {
            users::Column::Status.eq(status.as_str())
        }
        (Field::EmailVerified, Operator::Equals, Value::Flag(flag)) => {
            users::Column::EmailVerified.eq(*flag)
        }
        (Field::AccountLocked, Operator::Equals, Value::Flag(flag)) => {
            users::Column::AccountLocked.eq(*flag)
        }
        (Field::CreatedAt, Operator::AtLeast, Value::Instant(at)) => {
            users::Column::CreatedAt.gte(*at)
        }
        (Field::CreatedAt, Operator::AtMost, Value::Instant(at)) => {
            users::Column::CreatedAt.lte(*at)
        }
        (Field::CreatedAt, Operator::Equals, Value::Instant(at)) => users::Column::CreatedAt.eq(*at),
        _ => never(),
    }
}

// Field/value pairs the filter builder never produces.
fn never() -> SimpleExpr {
    Expr::val(false).into()
}

fn sort_column(field: SortField) -> users::Column {
    match field {
        SortField::Id => users::Column::Id,
        SortField::Username => users::Column::Username,
        SortField::Email => users::Column::Email,
        SortField::FirstName => users::Column::FirstName,
        SortField::LastName => users::Column::LastName,
        SortField::Status => users::Column::Status,
        SortField::CreatedAt => users::Column::CreatedAt,
        SortField::UpdatedAt => users::Column::UpdatedAt,
    }
}

/// Order by the requested column, then by id so pages are stable.
fn ordered(query: Select<users::Entity>, sort: SortSpec) -> Select<users::Entity> {
    let order = match sort.direction {
        Sort::Asc => Order::Asc,
        Sort::Desc => Order::Desc,
    };
    let query = query.order_by(sort_column(sort.field), order.clone());
    if sort.field == SortField::Id {
        query
    } else {
        query.order_by(users::Column::Id, order)
    }
}

// ── Role repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbRoleRepository {
    pub db: DatabaseConnection,
}

impl RoleRepository for DbRoleRepository {
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, AccountsError> {
        let rows = roles::Entity::find()
            .filter(lower_eq(roles::Column::Name, name))
            .find_with_related(permissions::Entity)
            .all(&self.db)
            .await
            .map_err(db_err("find role by name"))?;
        Ok(rows.into_iter().next().map(role_from_models))
    }

    async fn find_by_ids(&self, ids: &BTreeSet<RoleId>) -> Result<Vec<Role>, AccountsError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let rows = roles::Entity::find()
            .filter(roles::Column::Id.is_in(ids.iter().map(|id| id.0)))
            .find_with_related(permissions::Entity)
            .all(&self.db)
            .await
            .map_err(db_err("find roles by ids"))?;
        Ok(rows.into_iter().map(role_from_models).collect())
    }
}

fn role_from_models((role, grants): (roles::Model, Vec<permissions::Model>)) -> Role {
    Role {
        id: RoleId(role.id),
        name: role.name,
        description: role.description,
        permissions: grants
            .into_iter()
            .map(|p| Permission {
                id: PermissionId(p.id),
                name: p.name,
                description: p.description,
                resource: p.resource,
                action: p.action,
            })
            .collect(),
    }
}
