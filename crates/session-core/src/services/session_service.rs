// ============================================================================
// Session Core - Session Lifecycle Service
// File: crates/session-core/src/services/session_service.rs
// ============================================================================
//! Issue, verify, extend, enumerate and revoke sessions.
//!
//! The cache decides validity; the ledger is a projection for listing and
//! audit. A Create can therefore leave a session valid in the cache but
//! missing from the ledger (ledger write failed). That row is never
//! written, and the session simply ages out of the cache. A Remove can
//! leave a ledger row behind; the expiry reconciler deletes it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use session_security::SessionCookie;
use session_shared::config::SessionSettings;

use super::bounded;
use crate::domain::{SessionId, SessionRecord};
use crate::error::SessionError;
use crate::repositories::{PutMode, SessionCache, SessionLedger};

/// Session lifecycle manager, shared by every request handler.
pub struct SessionService<C: SessionCache, L: SessionLedger> {
    cache: Arc<C>,
    ledger: Arc<L>,
    settings: SessionSettings,
}

impl<C: SessionCache, L: SessionLedger> SessionService<C, L> {
    pub fn new(cache: Arc<C>, ledger: Arc<L>, settings: SessionSettings) -> Self {
        Self {
            cache,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    fn deadline(&self) -> Duration {
        self.settings.call_timeout()
    }

    /// Start a session for an authenticated user.
    pub async fn create(&self, user_id: Uuid) -> Result<SessionCookie, SessionError> {
        // 1. Claim a fresh token in the cache (must succeed)
        let id = self.claim_token(&user_id).await?;

        // 2. Index it for multi-device operations (must succeed)
        if let Err(e) = bounded(self.deadline(), "cache index add", self.cache.index_add(&user_id, &id)).await {
            error!(user_id = %user_id, session = id.redacted(), error = %e, "Failed to index new session");
            self.discard(&user_id, &id, false).await;
            return Err(e);
        }

        // 3. Record it in the ledger (best effort, except for a duplicate id)
        let record = SessionRecord::new(id.clone(), user_id);
        match bounded(self.deadline(), "ledger insert", self.ledger.insert(&record)).await {
            Ok(()) => {}
            Err(SessionError::Conflict(msg)) => {
                error!(user_id = %user_id, session = id.redacted(), "Ledger already holds this session id");
                self.discard(&user_id, &id, true).await;
                return Err(SessionError::Conflict(msg));
            }
            Err(e) => {
                warn!(
                    user_id = %user_id,
                    session = id.redacted(),
                    error = %e,
                    "Ledger insert failed; session is valid but unlisted until it expires"
                );
            }
        }

        info!(user_id = %user_id, session = id.redacted(), "Session created");
        Ok(SessionCookie::issue(&self.settings, id.as_str()))
    }

    /// Write a new token with `NX` so a collision can never take over
    /// someone else's session.
    async fn claim_token(&self, user_id: &Uuid) -> Result<SessionId, SessionError> {
        let attempts = self.settings.create_attempts.max(1);
        let ttl = self.settings.ttl();

        for attempt in 1..=attempts {
            let id = SessionId::generate();
            let written = bounded(
                self.deadline(),
                "cache put",
                self.cache.put(&id, user_id, ttl, PutMode::CreateOnly),
            )
            .await
            .inspect_err(|e| error!(user_id = %user_id, error = %e, "Failed to store new session"))?;

            if written {
                return Ok(id);
            }
            warn!(user_id = %user_id, attempt, "Generated session id already in cache, regenerating");
        }

        Err(SessionError::Conflict(format!(
            "no unused session id after {} attempts",
            attempts
        )))
    }

    /// Undo the cache side of a failed Create.
    async fn discard(&self, user_id: &Uuid, id: &SessionId, indexed: bool) {
        if let Err(e) = bounded(self.deadline(), "cache delete", self.cache.delete(id)).await {
            error!(user_id = %user_id, session = id.redacted(), error = %e, "Failed to discard session");
        }
        if indexed {
            if let Err(e) = bounded(self.deadline(), "cache index remove", self.cache.index_remove(user_id, id)).await {
                warn!(user_id = %user_id, session = id.redacted(), error = %e, "Failed to unindex discarded session");
            }
        }
    }

    /// Resolve the owner of a token. Cache only; the ledger is never consulted.
    pub async fn fetch(&self, token: &str) -> Result<Uuid, SessionError> {
        let id = SessionId::parse(token).ok_or(SessionError::NotFound)?;
        self.owner_of(&id).await
    }

    async fn owner_of(&self, id: &SessionId) -> Result<Uuid, SessionError> {
        match bounded(self.deadline(), "cache get", self.cache.get(id)).await {
            Ok(Some(user_id)) => Ok(user_id),
            Ok(None) => {
                debug!(session = id.redacted(), "Session not found");
                Err(SessionError::NotFound)
            }
            Err(e) => {
                warn!(session = id.redacted(), error = %e, "Session lookup failed");
                Err(e)
            }
        }
    }

    /// Live sessions of the user owning `token`, oldest first.
    pub async fn fetch_all(&self, token: &str) -> Result<Vec<SessionId>, SessionError> {
        let id = SessionId::parse(token).ok_or(SessionError::NotFound)?;
        let user_id = self.owner_of(&id).await?;
        self.live_sessions(&user_id).await
    }

    /// Re-check every index member against the cache and prune the ones
    /// that no longer resolve to this user.
    async fn live_sessions(&self, user_id: &Uuid) -> Result<Vec<SessionId>, SessionError> {
        let members = bounded(self.deadline(), "cache index members", self.cache.index_members(user_id)).await?;

        let lookups = futures::future::join_all(
            members
                .iter()
                .map(|member| bounded(self.deadline(), "cache get", self.cache.get(member))),
        )
        .await;

        let mut live = Vec::with_capacity(members.len());
        let mut stale = Vec::new();
        for (member, owner) in members.into_iter().zip(lookups) {
            match owner? {
                Some(owner) if owner == *user_id => live.push(member),
                _ => stale.push(member),
            }
        }

        for member in &stale {
            if let Err(e) = bounded(self.deadline(), "cache index remove", self.cache.index_remove(user_id, member)).await {
                warn!(user_id = %user_id, session = member.redacted(), error = %e, "Failed to prune stale index entry");
            }
        }
        if !stale.is_empty() {
            debug!(user_id = %user_id, pruned = stale.len(), "Pruned stale session index entries");
        }

        Ok(live)
    }

    /// Ledger records (with creation time) for the live sessions of the
    /// user owning `token`.
    pub async fn list_devices(&self, token: &str) -> Result<Vec<SessionRecord>, SessionError> {
        let id = SessionId::parse(token).ok_or(SessionError::NotFound)?;
        let user_id = self.owner_of(&id).await?;
        let live: HashSet<SessionId> = self.live_sessions(&user_id).await?.into_iter().collect();

        let mut records = bounded(self.deadline(), "ledger list", self.ledger.list_by_user(&user_id)).await?;
        records.retain(|record| live.contains(&record.id));
        Ok(records)
    }

    /// Refresh the TTL of a live session and return a refreshed cookie.
    pub async fn extend(&self, token: &str, user_id: Uuid) -> Result<SessionCookie, SessionError> {
        let id = SessionId::parse(token).ok_or(SessionError::NotFound)?;

        let owner = self.owner_of(&id).await?;
        if owner != user_id {
            warn!(session = id.redacted(), user_id = %user_id, "Extend requested by a user that does not own the session");
            return Err(SessionError::NotFound);
        }

        // XX: a session revoked since the lookup stays revoked
        let refreshed = bounded(
            self.deadline(),
            "cache put",
            self.cache.put(&id, &user_id, self.settings.ttl(), PutMode::ReplaceOnly),
        )
        .await?;
        if !refreshed {
            debug!(session = id.redacted(), "Session lapsed before it could be extended");
            return Err(SessionError::NotFound);
        }

        debug!(user_id = %user_id, session = id.redacted(), "Session extended");
        Ok(SessionCookie::issue(&self.settings, id.as_str()))
    }

    /// Revoke one session. Once the cache entry is gone the session is dead,
    /// so later failures are only logged.
    pub async fn remove(&self, token: &str) -> Result<SessionCookie, SessionError> {
        let expired = SessionCookie::expired(&self.settings);
        let Some(id) = SessionId::parse(token) else {
            return Ok(expired);
        };

        let owner = bounded(self.deadline(), "cache get", self.cache.get(&id)).await?;

        bounded(self.deadline(), "cache delete", self.cache.delete(&id))
            .await
            .inspect_err(|e| error!(session = id.redacted(), error = %e, "Failed to revoke session"))?;

        if let Some(user_id) = owner {
            if let Err(e) = bounded(self.deadline(), "cache index remove", self.cache.index_remove(&user_id, &id)).await {
                warn!(user_id = %user_id, session = id.redacted(), error = %e, "Failed to unindex revoked session");
            }
        }
        if let Err(e) = bounded(self.deadline(), "ledger delete", self.ledger.delete_by_id(&id)).await {
            warn!(session = id.redacted(), error = %e, "Failed to delete ledger row for revoked session");
        }

        match owner {
            Some(user_id) => info!(user_id = %user_id, session = id.redacted(), "Session removed"),
            None => debug!(session = id.redacted(), "Session already gone"),
        }
        Ok(expired)
    }

    /// Log the owner of `token` out everywhere. Individual failures are
    /// logged and skipped so every reachable session is revoked.
    pub async fn remove_all(&self, token: &str) -> Result<SessionCookie, SessionError> {
        let expired = SessionCookie::expired(&self.settings);
        let Some(id) = SessionId::parse(token) else {
            return Ok(expired);
        };

        let Some(user_id) = bounded(self.deadline(), "cache get", self.cache.get(&id)).await? else {
            debug!(session = id.redacted(), "Session already gone, nothing to revoke");
            return Ok(expired);
        };

        let mut targets: Vec<SessionId> = Vec::new();
        match bounded(self.deadline(), "cache index members", self.cache.index_members(&user_id)).await {
            Ok(members) => targets.extend(members),
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to read session index, falling back to ledger"),
        }
        // Sessions whose index entry was lost are still in the ledger
        match bounded(self.deadline(), "ledger list", self.ledger.list_by_user(&user_id)).await {
            Ok(records) => targets.extend(records.into_iter().map(|r| r.id)),
            Err(e) => warn!(user_id = %user_id, error = %e, "Failed to list ledger sessions"),
        }
        targets.push(id);

        let mut seen = HashSet::new();
        targets.retain(|target| seen.insert(target.clone()));

        let mut revoked = 0usize;
        let mut failed = 0usize;
        for target in &targets {
            if let Err(e) = bounded(self.deadline(), "cache delete", self.cache.delete(target)).await {
                failed += 1;
                error!(user_id = %user_id, session = target.redacted(), error = %e, "Failed to revoke session");
                continue;
            }
            revoked += 1;
            if let Err(e) = bounded(self.deadline(), "cache index remove", self.cache.index_remove(&user_id, target)).await {
                warn!(user_id = %user_id, session = target.redacted(), error = %e, "Failed to unindex revoked session");
            }
        }

        if let Err(e) = bounded(self.deadline(), "ledger delete", self.ledger.delete_all_by_user(&user_id)).await {
            warn!(user_id = %user_id, error = %e, "Failed to delete ledger rows for user");
        }

        info!(user_id = %user_id, revoked, failed, "Removed all sessions for user");
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{MockSessionCache, MockSessionLedger};

    fn service(cache: MockSessionCache, ledger: MockSessionLedger) -> SessionService<MockSessionCache, MockSessionLedger> {
        SessionService::new(Arc::new(cache), Arc::new(ledger), SessionSettings::default())
    }

    fn unavailable() -> SessionError {
        SessionError::StoreUnavailable("connection reset".into())
    }

    #[tokio::test]
    async fn test_create_aborts_before_ledger_when_cache_put_fails() {
        let mut cache = MockSessionCache::new();
        cache.expect_put().times(1).returning(|_, _, _, _| Err(unavailable()));
        let mut ledger = MockSessionLedger::new();
        ledger.expect_insert().times(0);

        let result = service(cache, ledger).create(Uuid::new_v4()).await;
        assert_eq!(result, Err(unavailable()));
    }

    #[tokio::test]
    async fn test_create_survives_ledger_failure() {
        let user = Uuid::new_v4();
        let mut cache = MockSessionCache::new();
        cache
            .expect_put()
            .withf(move |_, u, ttl, mode| *u == user && *ttl == Duration::from_secs(86400) && *mode == PutMode::CreateOnly)
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        cache.expect_index_add().times(1).returning(|_, _| Ok(()));
        let mut ledger = MockSessionLedger::new();
        ledger.expect_insert().times(1).returning(|_| Err(unavailable()));

        let cookie = service(cache, ledger).create(user).await.unwrap();
        assert!(SessionId::parse(&cookie.value).is_some());
        assert_eq!(cookie.max_age, 86400);
        assert!(!cookie.is_expired());
    }

    #[tokio::test]
    async fn test_create_regenerates_on_cache_collision() {
        let mut cache = MockSessionCache::new();
        let mut calls = 0;
        cache.expect_put().times(2).returning(move |_, _, _, _| {
            calls += 1;
            Ok(calls > 1)
        });
        cache.expect_index_add().times(1).returning(|_, _| Ok(()));
        let mut ledger = MockSessionLedger::new();
        ledger.expect_insert().times(1).returning(|_| Ok(()));

        assert!(service(cache, ledger).create(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_gives_up_after_bounded_attempts() {
        let mut cache = MockSessionCache::new();
        cache.expect_put().times(3).returning(|_, _, _, _| Ok(false));
        cache.expect_index_add().times(0);
        let mut ledger = MockSessionLedger::new();
        ledger.expect_insert().times(0);

        let result = service(cache, ledger).create(Uuid::new_v4()).await;
        assert!(matches!(result, Err(SessionError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_discards_session_when_index_add_fails() {
        let mut cache = MockSessionCache::new();
        cache.expect_put().times(1).returning(|_, _, _, _| Ok(true));
        cache.expect_index_add().times(1).returning(|_, _| Err(unavailable()));
        cache.expect_delete().times(1).returning(|_| Ok(()));
        cache.expect_index_remove().times(0);
        let mut ledger = MockSessionLedger::new();
        ledger.expect_insert().times(0);

        let result = service(cache, ledger).create(Uuid::new_v4()).await;
        assert_eq!(result, Err(unavailable()));
    }

    #[tokio::test]
    async fn test_create_ledger_conflict_is_fatal() {
        let mut cache = MockSessionCache::new();
        cache.expect_put().times(1).returning(|_, _, _, _| Ok(true));
        cache.expect_index_add().times(1).returning(|_, _| Ok(()));
        cache.expect_delete().times(1).returning(|_| Ok(()));
        cache.expect_index_remove().times(1).returning(|_, _| Ok(()));
        let mut ledger = MockSessionLedger::new();
        ledger
            .expect_insert()
            .times(1)
            .returning(|_| Err(SessionError::Conflict("duplicate key".into())));

        let result = service(cache, ledger).create(Uuid::new_v4()).await;
        assert_eq!(result, Err(SessionError::Conflict("duplicate key".into())));
    }

    #[tokio::test]
    async fn test_fetch_keeps_not_found_and_store_errors_apart() {
        let token = SessionId::generate();
        let missing = token.clone();
        let mut cache = MockSessionCache::new();
        cache
            .expect_get()
            .times(2)
            .returning(move |id| if *id == missing { Ok(None) } else { Err(unavailable()) });
        // no ledger expectations: any ledger call fails the test
        let svc = service(cache, MockSessionLedger::new());

        let not_found = svc.fetch(token.as_str()).await.unwrap_err();
        assert_eq!(not_found, SessionError::NotFound);
        assert!(!not_found.is_transient());

        let down = svc.fetch(SessionId::generate().as_str()).await.unwrap_err();
        assert!(down.is_transient());
        assert!(down.is_unauthenticated());
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_token_without_lookup() {
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(0);

        let result = service(cache, MockSessionLedger::new()).fetch("../../etc/passwd").await;
        assert_eq!(result, Err(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_fetch_all_prunes_lapsed_members() {
        let user = Uuid::new_v4();
        let current = SessionId::generate();
        let lapsed = SessionId::generate();

        let mut cache = MockSessionCache::new();
        let (c, l) = (current.clone(), lapsed.clone());
        cache
            .expect_get()
            .returning(move |id| Ok(if *id == l { None } else { Some(user) }));
        cache
            .expect_index_members()
            .times(1)
            .returning(move |_| Ok(vec![c.clone(), lapsed.clone()]));
        let pruned = current.clone();
        cache
            .expect_index_remove()
            .withf(move |u, id| *u == user && *id != pruned)
            .times(1)
            .returning(|_, _| Ok(()));

        let live = service(cache, MockSessionLedger::new())
            .fetch_all(current.as_str())
            .await
            .unwrap();
        assert_eq!(live, vec![current]);
    }

    #[tokio::test]
    async fn test_fetch_all_fails_closed_on_store_error() {
        let user = Uuid::new_v4();
        let current = SessionId::generate();
        let other = SessionId::generate();

        let mut cache = MockSessionCache::new();
        let c = current.clone();
        cache
            .expect_get()
            .returning(move |id| if *id == c { Ok(Some(user)) } else { Err(unavailable()) });
        let members = vec![current.clone(), other];
        cache.expect_index_members().returning(move |_| Ok(members.clone()));
        cache.expect_index_remove().times(0);

        let result = service(cache, MockSessionLedger::new()).fetch_all(current.as_str()).await;
        assert_eq!(result, Err(unavailable()));
    }

    #[tokio::test]
    async fn test_extend_refreshes_without_touching_index_or_ledger() {
        let user = Uuid::new_v4();
        let token = SessionId::generate();
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(move |_| Ok(Some(user)));
        cache
            .expect_put()
            .withf(|_, _, _, mode| *mode == PutMode::ReplaceOnly)
            .times(1)
            .returning(|_, _, _, _| Ok(true));
        cache.expect_index_add().times(0);
        cache.expect_index_remove().times(0);

        let cookie = service(cache, MockSessionLedger::new())
            .extend(token.as_str(), user)
            .await
            .unwrap();
        assert_eq!(cookie.value, token.as_str());
        assert_eq!(cookie.max_age, 86400);
    }

    #[tokio::test]
    async fn test_extend_refuses_foreign_session() {
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(|_| Ok(Some(Uuid::new_v4())));
        cache.expect_put().times(0);

        let result = service(cache, MockSessionLedger::new())
            .extend(SessionId::generate().as_str(), Uuid::new_v4())
            .await;
        assert_eq!(result, Err(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_extend_does_not_resurrect_revoked_session() {
        let user = Uuid::new_v4();
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(move |_| Ok(Some(user)));
        cache.expect_put().times(1).returning(|_, _, _, _| Ok(false));

        let result = service(cache, MockSessionLedger::new())
            .extend(SessionId::generate().as_str(), user)
            .await;
        assert_eq!(result, Err(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_remove_returns_expired_cookie_despite_ledger_failure() {
        let user = Uuid::new_v4();
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(move |_| Ok(Some(user)));
        cache.expect_delete().times(1).returning(|_| Ok(()));
        cache.expect_index_remove().times(1).returning(|_, _| Ok(()));
        let mut ledger = MockSessionLedger::new();
        ledger.expect_delete_by_id().times(1).returning(|_| Err(unavailable()));

        let cookie = service(cache, ledger)
            .remove(SessionId::generate().as_str())
            .await
            .unwrap();
        assert!(cookie.is_expired());
        assert!(cookie.value.is_empty());
    }

    #[tokio::test]
    async fn test_remove_fails_when_cache_delete_fails() {
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(|_| Ok(Some(Uuid::new_v4())));
        cache.expect_delete().times(1).returning(|_| Err(unavailable()));
        cache.expect_index_remove().times(0);
        let mut ledger = MockSessionLedger::new();
        ledger.expect_delete_by_id().times(0);

        let result = service(cache, ledger).remove(SessionId::generate().as_str()).await;
        assert_eq!(result, Err(unavailable()));
    }

    #[tokio::test]
    async fn test_remove_all_keeps_going_past_failed_members() {
        let user = Uuid::new_v4();
        let current = SessionId::generate();
        let broken = SessionId::generate();
        let healthy = SessionId::generate();
        let unindexed = SessionId::generate();

        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(move |_| Ok(Some(user)));
        let members = vec![broken.clone(), healthy.clone(), current.clone()];
        cache.expect_index_members().times(1).returning(move |_| Ok(members.clone()));
        let b = broken.clone();
        cache
            .expect_delete()
            .times(4)
            .returning(move |id| if *id == b { Err(unavailable()) } else { Ok(()) });
        cache.expect_index_remove().times(3).returning(|_, _| Ok(()));

        let mut ledger = MockSessionLedger::new();
        let extra = SessionRecord::new(unindexed, user);
        let dup = SessionRecord::new(healthy, user);
        ledger
            .expect_list_by_user()
            .times(1)
            .returning(move |_| Ok(vec![dup.clone(), extra.clone()]));
        ledger.expect_delete_all_by_user().times(1).returning(|_| Ok(3));

        let cookie = service(cache, ledger).remove_all(current.as_str()).await.unwrap();
        assert!(cookie.is_expired());
    }

    #[tokio::test]
    async fn test_remove_all_on_absent_session_succeeds() {
        let mut cache = MockSessionCache::new();
        cache.expect_get().times(1).returning(|_| Ok(None));
        cache.expect_delete().times(0);
        let mut ledger = MockSessionLedger::new();
        ledger.expect_delete_all_by_user().times(0);

        let cookie = service(cache, ledger)
            .remove_all(SessionId::generate().as_str())
            .await
            .unwrap();
        assert!(cookie.is_expired());
    }
}
