use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Expression indexes are not expressible through `Index::create()`.
const UP: &[&str] = &[
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_username_lower ON users (LOWER(username))",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_email_lower ON users (LOWER(email))",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_roles_name_lower ON roles (LOWER(name))",
];

const DOWN: &[&str] = &[
    "DROP INDEX IF EXISTS uq_roles_name_lower",
    "DROP INDEX IF EXISTS uq_users_email_lower",
    "DROP INDEX IF EXISTS uq_users_username_lower",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in UP {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for sql in DOWN {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }
}
