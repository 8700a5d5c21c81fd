use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use session_core::domain::{LedgerCursor, LedgerPage, SessionId, SessionRecord};
use session_core::error::SessionError;
use session_core::repositories::SessionLedger;

#[derive(Default)]
pub struct MemorySessionLedger {
    rows: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

fn scan_order(a: &SessionRecord, b: &SessionRecord) -> std::cmp::Ordering {
    (a.created_at, &a.id).cmp(&(b.created_at, &b.id))
}

#[async_trait]
impl SessionLedger for MemorySessionLedger {
    async fn insert(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let mut rows = self.rows.write();
        if rows.contains_key(&record.id) {
            return Err(SessionError::Conflict(format!(
                "session {} already recorded",
                record.id.redacted()
            )));
        }
        rows.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.rows.read().get(id).cloned())
    }

    async fn delete_by_id(&self, id: &SessionId) -> Result<u64, SessionError> {
        Ok(self.rows.write().remove(id).map_or(0, |_| 1))
    }

    async fn delete_all_by_user(&self, user_id: &Uuid) -> Result<u64, SessionError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|_, r| r.user_id != *user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn list_by_user(&self, user_id: &Uuid) -> Result<Vec<SessionRecord>, SessionError> {
        let mut records: Vec<SessionRecord> = self
            .rows
            .read()
            .values()
            .filter(|r| r.user_id == *user_id)
            .cloned()
            .collect();
        records.sort_by(scan_order);
        Ok(records)
    }

    async fn list_created_before(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<LedgerCursor>,
        limit: i64,
    ) -> Result<LedgerPage, SessionError> {
        let mut records: Vec<SessionRecord> = self
            .rows
            .read()
            .values()
            .filter(|r| r.created_at < cutoff)
            .filter(|r| match &after {
                Some(cursor) => {
                    (r.created_at, r.id.as_str()) > (cursor.created_at, cursor.session_id.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        records.sort_by(scan_order);

        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        records.truncate(limit);
        let next = if records.len() >= limit {
            records.last().map(LedgerCursor::from)
        } else {
            None
        };
        Ok(LedgerPage { records, next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record_at(user_id: Uuid, created_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id: SessionId::generate(),
            user_id,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let ledger = MemorySessionLedger::new();
        let record = SessionRecord::new(SessionId::generate(), Uuid::new_v4());

        ledger.insert(&record).await.unwrap();
        let err = ledger.insert(&record).await.unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let ledger = MemorySessionLedger::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let first = SessionRecord::new(SessionId::generate(), user);
        ledger.insert(&first).await.unwrap();
        ledger.insert(&SessionRecord::new(SessionId::generate(), user)).await.unwrap();
        ledger.insert(&SessionRecord::new(SessionId::generate(), other)).await.unwrap();

        assert_eq!(ledger.delete_by_id(&first.id).await.unwrap(), 1);
        assert_eq!(ledger.delete_by_id(&first.id).await.unwrap(), 0);
        assert_eq!(ledger.delete_all_by_user(&user).await.unwrap(), 1);
        assert_eq!(ledger.delete_all_by_user(&user).await.unwrap(), 0);
        assert_eq!(ledger.list_by_user(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_user_is_oldest_first() {
        let ledger = MemorySessionLedger::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let newer = record_at(user, now);
        let older = record_at(user, now - Duration::minutes(5));
        ledger.insert(&newer).await.unwrap();
        ledger.insert(&older).await.unwrap();

        let listed = ledger.list_by_user(&user).await.unwrap();
        assert_eq!(listed, vec![older, newer]);
    }

    #[tokio::test]
    async fn test_keyset_pages_cover_every_lapsed_row_once() {
        let ledger = MemorySessionLedger::new();
        let user = Uuid::new_v4();
        let now = Utc::now();
        for minutes in 1..=5 {
            ledger
                .insert(&record_at(user, now - Duration::hours(2) - Duration::minutes(minutes)))
                .await
                .unwrap();
        }
        ledger.insert(&record_at(user, now)).await.unwrap();

        let cutoff = now - Duration::hours(1);
        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = ledger.list_created_before(cutoff, cursor, 2).await.unwrap();
            pages += 1;
            seen.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| scan_order(&w[0], &w[1]).is_lt()));
    }
}
