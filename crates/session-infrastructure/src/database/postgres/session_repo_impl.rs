// ============================================================================
// Session Infrastructure - PostgreSQL Session Ledger
// File: crates/session-infrastructure/src/database/postgres/session_repo_impl.rs
// ============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use session_core::domain::{LedgerCursor, LedgerPage, SessionId, SessionRecord};
use session_core::error::SessionError;
use session_core::repositories::SessionLedger;

pub struct PgSessionLedger {
    pool: PgPool,
}

impl PgSessionLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionLedger for PgSessionLedger {
    async fn insert(&self, record: &SessionRecord) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            INSERT INTO auth.session (session_id, user_id, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.user_id)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_db_error("inserting session", e))?;

        info!(user_id = %record.user_id, session = %record.id.redacted(), "Session recorded");
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_id, created_at
            FROM auth.session
            WHERE session_id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_db_error("finding session by id", e))?;

        Ok(row.and_then(SessionRow::into_record))
    }

    async fn delete_by_id(&self, id: &SessionId) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM auth.session WHERE session_id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("deleting session", e))?;

        Ok(result.rows_affected())
    }

    async fn delete_all_by_user(&self, user_id: &Uuid) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM auth.session WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_db_error("deleting user sessions", e))?;

        Ok(result.rows_affected())
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<SessionRecord>, SessionError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_id, created_at
            FROM auth.session
            WHERE user_id = $1
            ORDER BY created_at ASC, session_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("listing user sessions", e))?;

        Ok(rows.into_iter().filter_map(SessionRow::into_record).collect())
    }

    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> Result<LedgerPage, SessionError> {
        let (after_created, after_id) = match after {
            Some(cursor) => (Some(cursor.created_at), Some(cursor.session_id)),
            None => (None, None),
        };

        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT session_id, user_id, created_at
            FROM auth.session
            WHERE created_at < $1
              AND ($2::timestamptz IS NULL OR (created_at, session_id) > ($2, $3))
            ORDER BY created_at ASC, session_id ASC
            LIMIT $4
            "#,
        )
        .bind(cutoff)
        .bind(after_created)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_db_error("scanning lapsed sessions", e))?;

        Ok(into_page(rows, limit))
    }
}

fn map_db_error(action: &str, e: sqlx::Error) -> SessionError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return SessionError::Conflict(db_err.message().to_string());
        }
    }
    error!("Database error {}: {}", action, e);
    SessionError::StoreUnavailable(e.to_string())
}

/// The cursor comes from the last raw row, readable or not.
fn into_page(rows: Vec<SessionRow>, limit: i64) -> LedgerPage {
    let next = if rows.len() as i64 >= limit {
        rows.last().map(|row| LedgerCursor {
            created_at: row.created_at,
            session_id: row.session_id.clone(),
        })
    } else {
        None
    };

    LedgerPage {
        records: rows.into_iter().filter_map(SessionRow::into_record).collect(),
        next,
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, FromRow)]
struct SessionRow {
    session_id: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

impl SessionRow {
    /// Rows whose id does not look like an issued token are skipped.
    fn into_record(self) -> Option<SessionRecord> {
        match SessionId::parse(&self.session_id) {
            Some(id) => Some(SessionRecord {
                id,
                user_id: self.user_id,
                created_at: self.created_at,
            }),
            None => {
                warn!(user_id = %self.user_id, "Skipping ledger row with malformed session id");
                None
            }
        }
    }
}
