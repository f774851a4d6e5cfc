//! Sparse user filters and the predicate set they compile to.
//!
//! A [`UserSearchFilter`] is folded into a [`PredicateSet`]: a conjunction of
//! predicates, one per present filter field. Each predicate is a single
//! `(field, operator, value)` condition or a disjunction of them. Stores
//! translate the set into their own query syntax; [`PredicateSet::matches`]
//! is the reference semantics for stores that evaluate in memory.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use keystone_domain::pagination::{PageError, Sort};
use keystone_domain::user::UserStatus;

use crate::domain::types::User;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid status filter: {0}")]
    InvalidStatus(String),
    #[error("unknown sort field: {0}")]
    UnknownSortField(String),
    #[error(transparent)]
    Page(#[from] PageError),
}

/// Optional constraints on a user listing. `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct UserSearchFilter {
    /// Case-insensitive substring of first name, last name, username or email.
    pub search_term: Option<String>,
    /// Upper-case status name, e.g. `"LOCKED"`.
    pub status: Option<String>,
    pub role_name: Option<String>,
    pub email_verified: Option<bool>,
    pub account_locked: Option<bool>,
    /// Inclusive lower bound on `created_at`.
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    FirstName,
    LastName,
    Username,
    Email,
    Status,
    RoleName,
    EmailVerified,
    AccountLocked,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Case-insensitive substring.
    Contains,
    Equals,
    /// Case-insensitive equality.
    EqualsIgnoreCase,
    AtLeast,
    AtMost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Status(UserStatus),
    Flag(bool),
    Instant(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(field: Field, op: Operator, value: Value) -> Self {
        Self { field, op, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Single(Condition),
    /// Matches when any condition matches.
    AnyOf(Vec<Condition>),
}

/// Conjunction of predicates. Empty means "match everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateSet {
    predicates: Vec<Predicate>,
}

type PredicateBuilder = fn(&UserSearchFilter) -> Result<Option<Predicate>, FilterError>;

/// Applied in order; each contributes at most one predicate.
const BUILDERS: [PredicateBuilder; 7] = [
    search_term_predicate,
    status_predicate,
    role_name_predicate,
    email_verified_predicate,
    account_locked_predicate,
    created_after_predicate,
    created_before_predicate,
];

const TEXT_SEARCH_FIELDS: [Field; 4] = [
    Field::FirstName,
    Field::LastName,
    Field::Username,
    Field::Email,
];

fn search_term_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    let Some(term) = filter.search_term.as_deref() else {
        return Ok(None);
    };
    if term.trim().is_empty() {
        return Ok(None);
    }
    let conditions = TEXT_SEARCH_FIELDS
        .iter()
        .map(|&field| Condition::new(field, Operator::Contains, Value::Text(term.to_owned())))
        .collect();
    Ok(Some(Predicate::AnyOf(conditions)))
}

fn status_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    filter
        .status
        .as_deref()
        .map(|raw| {
            let status = raw
                .trim()
                .parse::<UserStatus>()
                .map_err(|_| FilterError::InvalidStatus(raw.to_owned()))?;
            Ok(Predicate::Single(Condition::new(
                Field::Status,
                Operator::Equals,
                Value::Status(status),
            )))
        })
        .transpose()
}

fn role_name_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    Ok(filter
        .role_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            Predicate::Single(Condition::new(
                Field::RoleName,
                Operator::EqualsIgnoreCase,
                Value::Text(name.to_owned()),
            ))
        }))
}

fn email_verified_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    Ok(filter.email_verified.map(|flag| {
        Predicate::Single(Condition::new(
            Field::EmailVerified,
            Operator::Equals,
            Value::Flag(flag),
        ))
    }))
}

fn account_locked_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    Ok(filter.account_locked.map(|flag| {
        Predicate::Single(Condition::new(
            Field::AccountLocked,
            Operator::Equals,
            Value::Flag(flag),
        ))
    }))
}

fn created_after_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    Ok(filter.created_after.map(|at| {
        Predicate::Single(Condition::new(
            Field::CreatedAt,
            Operator::AtLeast,
            Value::Instant(at),
        ))
    }))
}

fn created_before_predicate(filter: &UserSearchFilter) -> Result<Option<Predicate>, FilterError> {
    Ok(filter.created_before.map(|at| {
        Predicate::Single(Condition::new(
            Field::CreatedAt,
            Operator::AtMost,
            Value::Instant(at),
        ))
    }))
}

impl PredicateSet {
    /// Fold the filter into a conjunction, skipping absent fields.
    pub fn from_filter(filter: &UserSearchFilter) -> Result<Self, FilterError> {
        let predicates = BUILDERS
            .iter()
            .map(|build| build(filter))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        Ok(Self { predicates })
    }

    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Evaluate against a user and the names of the roles it holds.
    pub fn matches(&self, user: &User, role_names: &BTreeSet<String>) -> bool {
        self.predicates.iter().all(|predicate| match predicate {
            Predicate::Single(condition) => condition.matches(user, role_names),
            Predicate::AnyOf(conditions) => conditions.iter().any(|c| c.matches(user, role_names)),
        })
    }
}

impl Condition {
    fn matches(&self, user: &User, role_names: &BTreeSet<String>) -> bool {
        match (self.field, &self.value) {
            (Field::FirstName, Value::Text(v)) => text_matches(self.op, &user.first_name, v),
            (Field::LastName, Value::Text(v)) => text_matches(self.op, &user.last_name, v),
            (Field::Username, Value::Text(v)) => text_matches(self.op, &user.username, v),
            (Field::Email, Value::Text(v)) => text_matches(self.op, &user.email, v),
            (Field::RoleName, Value::Text(v)) => {
                role_names.iter().any(|name| text_matches(self.op, name, v))
            }
            (Field::Status, Value::Status(v)) => self.op == Operator::Equals && user.status == *v,
            (Field::EmailVerified, Value::Flag(v)) => {
                self.op == Operator::Equals && user.email_verified == *v
            }
            (Field::AccountLocked, Value::Flag(v)) => {
                self.op == Operator::Equals && user.account_locked == *v
            }
            (Field::CreatedAt, Value::Instant(v)) => match self.op {
                Operator::AtLeast => user.created_at >= *v,
                Operator::AtMost => user.created_at <= *v,
                Operator::Equals => user.created_at == *v,
                _ => false,
            },
            _ => false,
        }
    }
}

fn text_matches(op: Operator, haystack: &str, needle: &str) -> bool {
    match op {
        Operator::Contains => haystack.to_lowercase().contains(&needle.to_lowercase()),
        Operator::Equals => haystack == needle,
        Operator::EqualsIgnoreCase => haystack.to_lowercase() == needle.to_lowercase(),
        Operator::AtLeast | Operator::AtMost => false,
    }
}

// ── Sorting ──────────────────────────────────────────────────────────────────

/// Sortable user attributes. Anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Username,
    Email,
    FirstName,
    LastName,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for SortField {
    type Err = FilterError;

    /// Accepts camelCase and snake_case names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(Self::Id),
            "username" => Ok(Self::Username),
            "email" => Ok(Self::Email),
            "firstName" | "first_name" => Ok(Self::FirstName),
            "lastName" | "last_name" => Ok(Self::LastName),
            "status" => Ok(Self::Status),
            "createdAt" | "created_at" => Ok(Self::CreatedAt),
            "updatedAt" | "updated_at" => Ok(Self::UpdatedAt),
            other => Err(FilterError::UnknownSortField(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: Sort,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: Sort::Desc,
        }
    }
}

impl SortSpec {
    pub fn new(field: SortField, direction: Sort) -> Self {
        Self { field, direction }
    }

    /// Parse raw transport values. A missing field falls back to the default
    /// sort; a missing direction means ascending.
    pub fn parse(field: Option<&str>, direction: Option<&str>) -> Result<Self, FilterError> {
        let Some(field) = field.filter(|f| !f.trim().is_empty()) else {
            return Ok(Self::default());
        };
        let direction = match direction {
            Some(d) => d.trim().parse()?,
            None => Sort::Asc,
        };
        Ok(Self::new(field.parse()?, direction))
    }

    /// Total order for in-memory stores. Ties break on id so paging is stable.
    pub fn compare(&self, a: &User, b: &User) -> Ordering {
        let ordering = match self.field {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Username => a.username.cmp(&b.username),
            SortField::Email => a.email.cmp(&b.email),
            SortField::FirstName => a.first_name.cmp(&b.first_name),
            SortField::LastName => a.last_name.cmp(&b.last_name),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        };
        let ordering = ordering.then_with(|| a.id.cmp(&b.id));
        match self.direction {
            Sort::Asc => ordering,
            Sort::Desc => ordering.reverse(),
        }
    }
}
