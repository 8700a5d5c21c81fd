//! Redis keyspace expiry feed
//!
//! Subscribes to `__keyevent@<db>__:expired` and yields the session tokens
//! whose `session:<token>` keys lapsed. Unrelated keys are dropped.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt::Display;
use tracing::{error, info};

use session_core::domain::SessionId;
use session_core::error::SessionError;
use session_core::repositories::{ExpiryFeed, ExpiryStream};
use session_shared::config::RedisSettings;

const KEYSPACE_EVENTS_PARAM: &str = "notify-keyspace-events";

pub struct RedisExpiryFeed {
    client: redis::Client,
    db: i64,
    configure_keyspace_events: bool,
}

impl RedisExpiryFeed {
    pub fn new(settings: &RedisSettings) -> Result<Self, SessionError> {
        let client = redis::Client::open(settings.url.as_str())
            .map_err(|e| unavailable("opening client", e))?;

        Ok(Self {
            client,
            db: settings.db,
            configure_keyspace_events: settings.configure_keyspace_events,
        })
    }

    pub fn channel(&self) -> String {
        expired_channel(self.db)
    }

    /// Turn on expired-key events without dropping flags others rely on.
    async fn ensure_keyspace_events(&self) -> Result<(), SessionError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| unavailable("connecting", e))?;

        let current: HashMap<String, String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg(KEYSPACE_EVENTS_PARAM)
            .query_async(&mut conn)
            .await
            .map_err(|e| unavailable("CONFIG GET", e))?;
        let current = current.get(KEYSPACE_EVENTS_PARAM).map(String::as_str).unwrap_or("");

        if let Some(flags) = merged_keyspace_flags(current) {
            redis::cmd("CONFIG")
                .arg("SET")
                .arg(KEYSPACE_EVENTS_PARAM)
                .arg(&flags)
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| unavailable("CONFIG SET", e))?;
            info!(flags = %flags, "Enabled keyspace expiry notifications");
        }
        Ok(())
    }
}

#[async_trait]
impl ExpiryFeed for RedisExpiryFeed {
    async fn subscribe(&self) -> Result<ExpiryStream, SessionError> {
        if self.configure_keyspace_events {
            self.ensure_keyspace_events().await?;
        }

        let channel = self.channel();
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| unavailable("opening pubsub", e))?;
        pubsub
            .psubscribe(&channel)
            .await
            .map_err(|e| unavailable("PSUBSCRIBE", e))?;

        info!(channel = %channel, "Listening for expired session keys");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let key: String = msg.get_payload().ok()?;
            SessionId::from_cache_key(&key)
        });
        Ok(stream.boxed())
    }
}

pub fn expired_channel(db: i64) -> String {
    format!("__keyevent@{}__:expired", db)
}

/// Flags to write so that keyevent `expired` notifications fire, or `None`
/// when `current` already covers them.
fn merged_keyspace_flags(current: &str) -> Option<String> {
    let has_keyevent = current.contains('E');
    let has_expired = current.contains('x') || current.contains('A');
    if has_keyevent && has_expired {
        return None;
    }

    let mut flags = current.to_string();
    if !has_keyevent {
        flags.push('E');
    }
    if !has_expired {
        flags.push('x');
    }
    Some(flags)
}

fn unavailable(action: &str, e: impl Display) -> SessionError {
    error!("Redis expiry feed error during {}: {}", action, e);
    SessionError::StoreUnavailable(format!("{}: {}", action, e))
}
