//! Session ledger trait (port)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{LedgerCursor, LedgerPage, SessionId, SessionRecord};
use crate::error::SessionError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Fails with [`SessionError::Conflict`] on a duplicate id.
    async fn insert(&self, record: &SessionRecord) -> Result<(), SessionError>;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError>;

    /// Returns the number of rows removed (0 or 1).
    async fn delete_by_id(&self, id: &SessionId) -> Result<u64, SessionError>;

    async fn delete_all_by_user(&self, user_id: &Uuid) -> Result<u64, SessionError>;

    /// Ordered by `created_at` ascending, ties broken by id.
    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<SessionRecord>, SessionError>;

    /// Scan up to `limit` rows created before `cutoff`, strictly after
    /// `after`. `next` is set whenever the scan returned `limit` rows,
    /// counting rows dropped from `records` as unreadable.
    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> Result<LedgerPage, SessionError>;
}
