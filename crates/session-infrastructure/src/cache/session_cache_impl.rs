// ============================================================================
// Session Infrastructure - Redis Session Cache
// File: crates/session-infrastructure/src/cache/session_cache_impl.rs
// ============================================================================
//
// Layout:
//   session:<token>          STRING  user UUID, EX = session max age
//   user_sessions:<user_id>  ZSET    token members scored by insert time (ms)

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{self, AsyncCommands};
use deadpool_redis::{Connection, Pool};
use std::fmt::Display;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use session_core::domain::{user_index_key, SessionId};
use session_core::error::SessionError;
use session_core::repositories::{PutMode, SessionCache};

pub struct RedisSessionCache {
    pool: Pool,
}

impl RedisSessionCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<Connection, SessionError> {
        self.pool.get().await.map_err(|e| unavailable("acquiring connection", e))
    }
}

#[async_trait]
impl SessionCache for RedisSessionCache {
    async fn put(
        &self,
        id: &SessionId,
        user_id: &Uuid,
        ttl: Duration,
        mode: PutMode,
    ) -> Result<bool, SessionError> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = set_command(id, user_id, ttl, mode)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("SET", e))?;

        // NX / XX answer nil when the condition fails.
        Ok(reply.is_some())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Uuid>, SessionError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn
            .get(id.cache_key())
            .await
            .map_err(|e| unavailable("GET", e))?;

        Ok(value.and_then(|raw| match Uuid::parse_str(&raw) {
            Ok(user_id) => Some(user_id),
            Err(_) => {
                warn!(session = %id.redacted(), "Cache entry holds a malformed user id");
                None
            }
        }))
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .del(id.cache_key())
            .await
            .map_err(|e| unavailable("DEL", e))?;
        Ok(())
    }

    async fn index_add(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .zadd(user_index_key(user_id), id.as_str(), Utc::now().timestamp_millis())
            .await
            .map_err(|e| unavailable("ZADD", e))?;
        Ok(())
    }

    async fn index_remove(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .zrem(user_index_key(user_id), id.as_str())
            .await
            .map_err(|e| unavailable("ZREM", e))?;
        Ok(())
    }

    async fn index_members(&self, user_id: &Uuid) -> Result<Vec<SessionId>, SessionError> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn
            .zrange(user_index_key(user_id), 0, -1)
            .await
            .map_err(|e| unavailable("ZRANGE", e))?;

        Ok(members.iter().filter_map(|m| SessionId::parse(m)).collect())
    }
}

fn set_command(id: &SessionId, user_id: &Uuid, ttl: Duration, mode: PutMode) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(id.cache_key())
        .arg(user_id.to_string())
        .arg("EX")
        .arg(ttl.as_secs().max(1));
    match mode {
        PutMode::Upsert => {}
        PutMode::CreateOnly => {
            cmd.arg("NX");
        }
        PutMode::ReplaceOnly => {
            cmd.arg("XX");
        }
    }
    cmd
}

fn unavailable(action: &str, e: impl Display) -> SessionError {
    error!("Redis error during {}: {}", action, e);
    SessionError::StoreUnavailable(format!("{}: {}", action, e))
}
