//! Read-only projections over the user → role → permission graph.
//!
//! Every function takes the roles already loaded for one user. Nothing here
//! decides whether an action is allowed; callers get the facts only.

use std::collections::BTreeSet;

use crate::domain::types::Role;

/// Union of permission names across `roles`, deduplicated by name.
pub fn effective_permissions(roles: &[Role]) -> BTreeSet<String> {
    roles
        .iter()
        .flat_map(|role| role.permissions.iter())
        .map(|permission| permission.name.clone())
        .collect()
}

pub fn role_names(roles: &[Role]) -> BTreeSet<String> {
    roles.iter().map(|role| role.name.clone()).collect()
}
