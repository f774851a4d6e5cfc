use sea_orm::Database;
use tracing::info;

use keystone_accounts::config::AccountsConfig;
use keystone_accounts::infra::cache::{LocalUserCache, RedisUserCache, UserCacheBackend};
use keystone_accounts::router::build_router;
use keystone_accounts::state::AppState;
use keystone_core::tracing::init_tracing;

#[tokio::main]
async fn main() {
    init_tracing("info,keystone_accounts=debug");

    let config = AccountsConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let cache = match &config.redis_url {
        Some(url) => {
            let pool = deadpool_redis::Config::from_url(url)
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .expect("failed to create Redis pool");
            UserCacheBackend::Redis(RedisUserCache {
                pool,
                ttl_secs: config.user_cache_ttl_secs,
            })
        }
        None => UserCacheBackend::Local(LocalUserCache::new()),
    };
    info!(backend = cache.name(), "user cache ready");

    let router = build_router(AppState::new(db, cache));
    let addr = format!("0.0.0.0:{}", config.accounts_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind");

    info!("accounts service listening on {addr}");
    axum::serve(listener, router).await.expect("server error");
}
