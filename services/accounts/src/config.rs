use keystone_core::config::{optional, parsed_or, required};

/// Accounts service configuration loaded from environment variables.
#[derive(Debug)]
pub struct AccountsConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Selects the Redis user cache when set; otherwise entries stay in process.
    pub redis_url: Option<String>,
    /// Redis entry lifetime (default 600). Env var: `USER_CACHE_TTL_SECS`.
    pub user_cache_ttl_secs: u64,
    /// TCP port for the probe server (default 3114). Env var: `ACCOUNTS_PORT`.
    pub accounts_port: u16,
}

impl AccountsConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: required("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            user_cache_ttl_secs: parsed_or("USER_CACHE_TTL_SECS", 600),
            accounts_port: parsed_or("ACCOUNTS_PORT", 3114),
        }
    }
}
