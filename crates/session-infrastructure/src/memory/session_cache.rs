use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};
use uuid::Uuid;

use session_core::domain::SessionId;
use session_core::error::SessionError;
use session_core::repositories::{ExpiryFeed, ExpiryStream, PutMode, SessionCache};

const EXPIRY_CHANNEL_CAPACITY: usize = 1024;

struct Entry {
    user_id: Uuid,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// TTL cache with a per-user index and expiry notifications.
///
/// There is no background expiry. Lapsed entries are evicted lazily on
/// access or when the owner calls [`purge_expired`], and each eviction is
/// published to every [`ExpiryFeed`] subscriber.
///
/// [`purge_expired`]: MemorySessionCache::purge_expired
pub struct MemorySessionCache {
    entries: DashMap<SessionId, Entry>,
    index: DashMap<Uuid, Vec<SessionId>>,
    expired_tx: broadcast::Sender<SessionId>,
}

impl Default for MemorySessionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionCache {
    pub fn new() -> Self {
        let (expired_tx, _) = broadcast::channel(EXPIRY_CHANNEL_CAPACITY);
        Self {
            entries: DashMap::new(),
            index: DashMap::new(),
            expired_tx,
        }
    }

    /// Drop an entry as if its TTL ran out. Returns whether it existed.
    pub fn expire(&self, id: &SessionId) -> bool {
        if self.entries.remove(id).is_some() {
            self.notify_expired(id);
            true
        } else {
            false
        }
    }

    /// Evict every lapsed entry. Returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let lapsed: Vec<SessionId> = self
            .entries
            .iter()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key().clone())
            .collect();

        lapsed
            .iter()
            .filter(|id| self.evict_if_expired(id, now))
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_if_expired(&self, id: &SessionId, now: Instant) -> bool {
        let evicted = self.entries.remove_if(id, |_, e| e.is_expired(now)).is_some();
        if evicted {
            self.notify_expired(id);
        }
        evicted
    }

    fn notify_expired(&self, id: &SessionId) {
        // No receivers is fine.
        let _ = self.expired_tx.send(id.clone());
        debug!(session = %id.redacted(), "Cache entry expired");
    }
}

#[async_trait]
impl SessionCache for MemorySessionCache {
    async fn put(
        &self,
        id: &SessionId,
        user_id: &Uuid,
        ttl: Duration,
        mode: PutMode,
    ) -> Result<bool, SessionError> {
        let now = Instant::now();
        self.evict_if_expired(id, now);

        let entry = Entry {
            user_id: *user_id,
            expires_at: now + ttl,
        };

        let written = match mode {
            PutMode::Upsert => {
                self.entries.insert(id.clone(), entry);
                true
            }
            PutMode::CreateOnly => match self.entries.entry(id.clone()) {
                MapEntry::Occupied(_) => false,
                MapEntry::Vacant(slot) => {
                    slot.insert(entry);
                    true
                }
            },
            PutMode::ReplaceOnly => match self.entries.get_mut(id) {
                Some(mut current) => {
                    *current = entry;
                    true
                }
                None => false,
            },
        };
        Ok(written)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Uuid>, SessionError> {
        self.evict_if_expired(id, Instant::now());
        Ok(self.entries.get(id).map(|e| e.user_id))
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.entries.remove(id);
        Ok(())
    }

    async fn index_add(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError> {
        let mut members = self.index.entry(*user_id).or_default();
        if !members.contains(id) {
            members.push(id.clone());
        }
        Ok(())
    }

    async fn index_remove(&self, user_id: &Uuid, id: &SessionId) -> Result<(), SessionError> {
        if let Some(mut members) = self.index.get_mut(user_id) {
            members.retain(|m| m != id);
        }
        self.index.remove_if(user_id, |_, members| members.is_empty());
        Ok(())
    }

    async fn index_members(&self, user_id: &Uuid) -> Result<Vec<SessionId>, SessionError> {
        Ok(self
            .index
            .get(user_id)
            .map(|members| members.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ExpiryFeed for MemorySessionCache {
    async fn subscribe(&self) -> Result<ExpiryStream, SessionError> {
        let rx = self.expired_tx.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(id) => return Some((id, rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Expiry subscriber lagged; sweep will catch up");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }
}
