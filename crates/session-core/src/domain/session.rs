//! Session identity and the durable session record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use session_security::token;
use session_shared::constants::{SESSION_KEY_PREFIX, USER_INDEX_KEY_PREFIX};
use std::fmt;
use uuid::Uuid;

/// Opaque session token. Doubles as cache key suffix and ledger primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(token::generate_session_token())
    }

    /// Accepts only tokens shaped like generated ones.
    pub fn parse(token: &str) -> Option<Self> {
        token::is_well_formed(token).then(|| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix safe to put in logs.
    pub fn redacted(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }

    pub fn cache_key(&self) -> String {
        format!("{}{}", SESSION_KEY_PREFIX, self.0)
    }

    /// Inverse of [`SessionId::cache_key`]; `None` for foreign keys.
    pub fn from_cache_key(key: &str) -> Option<Self> {
        key.strip_prefix(SESSION_KEY_PREFIX).and_then(Self::parse)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::parse(&token).ok_or_else(|| "malformed session id".to_string())
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn user_index_key(user_id: &Uuid) -> String {
    format!("{}{}", USER_INDEX_KEY_PREFIX, user_id)
}

/// Durable record of an issued session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(id: SessionId, user_id: Uuid) -> Self {
        Self {
            id,
            user_id,
            created_at: Utc::now(),
        }
    }
}

/// Keyset position in a ledger scan ordered by `(created_at, session_id)`.
///
/// Holds the raw stored key, so rows that do not parse as a [`SessionId`]
/// still move the scan forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerCursor {
    pub created_at: DateTime<Utc>,
    pub session_id: String,
}

impl From<&SessionRecord> for LedgerCursor {
    fn from(record: &SessionRecord) -> Self {
        Self {
            created_at: record.created_at,
            session_id: record.id.as_str().to_string(),
        }
    }
}

/// One page of a ledger scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerPage {
    /// Well-formed rows of the page; may be fewer than were scanned.
    pub records: Vec<SessionRecord>,
    /// Position of the last scanned row. `None` once the scan is exhausted.
    pub next: Option<LedgerCursor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_round_trip() {
        let id = SessionId::generate();
        let key = id.cache_key();
        assert!(key.starts_with("session:"));
        assert_eq!(SessionId::from_cache_key(&key), Some(id));
    }

    #[test]
    fn test_foreign_keys_are_ignored() {
        let id = SessionId::generate();
        assert_eq!(SessionId::from_cache_key(id.as_str()), None);
        assert_eq!(SessionId::from_cache_key("session:not-a-token"), None);
        assert_eq!(SessionId::from_cache_key(&format!("other:{}", id)), None);
    }

    #[test]
    fn test_redacted_is_a_prefix() {
        let id = SessionId::generate();
        assert_eq!(id.redacted().len(), 8);
        assert!(id.as_str().starts_with(id.redacted()));
    }

    #[test]
    fn test_deserialize_rejects_malformed_ids() {
        let id = SessionId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(serde_json::from_str::<SessionId>(&json).unwrap(), id);

        assert!(serde_json::from_str::<SessionId>("\"ééééééééé\"").is_err());
        assert!(serde_json::from_str::<SessionId>("\"short\"").is_err());
    }

    #[test]
    fn test_user_index_key() {
        let user = Uuid::nil();
        assert_eq!(
            user_index_key(&user),
            "user_sessions:00000000-0000-0000-0000-000000000000"
        );
    }
}
