//! Session cache trait (port)
//!
//! The cache is the only authority on whether a token is valid. The
//! per-user index is a hint that may hold stale members.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::SessionId;
use crate::error::SessionError;

/// Write condition for [`SessionCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Write unconditionally.
    Upsert,
    /// Write only if the token is not present (`NX`).
    CreateOnly,
    /// Write only if the token is still present (`XX`).
    ReplaceOnly,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Store `token -> user_id` with a TTL. Returns whether the write happened.
    async fn put(
        &self,
        id: &SessionId,
        user_id: &Uuid,
        ttl: Duration,
        mode: PutMode,
    ) -> Result<bool, SessionError>;

    /// `Ok(None)` means absent or expired; errors are transport failures.
    async fn get(&self, id: &SessionId) -> Result<Option<Uuid>, SessionError>;

    /// No-op when absent.
    async fn delete(&self, id: &SessionId) -> Result<(), SessionError>;

    async fn index_add(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError>;

    async fn index_remove(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError>;

    /// Members in insertion order. May include tokens that already lapsed.
    async fn index_members(&self, user_id: &Uuid) -> Result<Vec<SessionId>, SessionError>;
}
