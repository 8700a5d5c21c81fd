//! Redis connection pool

use deadpool_redis::{Config, CreatePoolError, Pool, PoolConfig, Runtime};
use session_shared::config::RedisSettings;

pub fn create_redis_pool(settings: &RedisSettings) -> Result<Pool, CreatePoolError> {
    let mut cfg = Config::from_url(settings.url.clone());
    cfg.pool = Some(PoolConfig::new(settings.max_connections));
    cfg.create_pool(Some(Runtime::Tokio1))
}
