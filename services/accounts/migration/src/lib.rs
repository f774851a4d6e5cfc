use sea_orm_migration::prelude::*;

mod m20251018_000001_create_users;
mod m20251018_000002_create_roles_and_permissions;
mod m20251018_000003_create_memberships;
mod m20251018_000004_add_case_insensitive_unique_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20251018_000001_create_users::Migration),
            Box::new(m20251018_000002_create_roles_and_permissions::Migration),
            Box::new(m20251018_000003_create_memberships::Migration),
            Box::new(m20251018_000004_add_case_insensitive_unique_indexes::Migration),
        ]
    }
}
