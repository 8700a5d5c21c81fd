// ============================================================================
// Session Core - Expiry Reconciler
// File: crates/session-core/src/services/expiry_reconciler.rs
// ============================================================================
//! Background task that follows cache expiry notifications and removes the
//! matching ledger rows and index entries.
//!
//! Expiry notifications are fire-and-forget, so anything published while
//! the subscription is down is lost. Each (re)subscription is followed by a
//! sweep over ledger rows old enough to have lapsed, and the sweep repeats
//! on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use session_shared::config::{ReconcilerSettings, SessionSettings};

use super::bounded;
use crate::domain::{LedgerCursor, SessionId};
use crate::error::SessionError;
use crate::repositories::{ExpiryFeed, ExpiryStream, SessionCache, SessionLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerStatus {
    Starting,
    Subscribed,
    Reconnecting { attempt: u32 },
    Stopped,
}

/// Read side of the reconciler status, for readiness probes.
#[derive(Debug, Clone)]
pub struct ReconcilerHealth {
    rx: watch::Receiver<ReconcilerStatus>,
}

impl ReconcilerHealth {
    pub fn status(&self) -> ReconcilerStatus {
        *self.rx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ReconcilerStatus::Subscribed
    }

    /// Resolves once subscribed; `false` if the reconciler went away first.
    pub async fn wait_until_ready(&self) -> bool {
        let mut rx = self.rx.clone();
        let ready = rx
            .wait_for(|status| *status == ReconcilerStatus::Subscribed)
            .await
            .is_ok();
        ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Removed,
    AlreadyGone,
}

enum Flow {
    Disconnected,
    Shutdown,
}

pub struct ExpiryReconciler<C: SessionCache, L: SessionLedger, F: ExpiryFeed> {
    cache: Arc<C>,
    ledger: Arc<L>,
    feed: Arc<F>,
    settings: ReconcilerSettings,
    session_max_age: Option<chrono::Duration>,
    call_timeout: Duration,
    status: watch::Sender<ReconcilerStatus>,
}

impl<C: SessionCache, L: SessionLedger, F: ExpiryFeed> ExpiryReconciler<C, L, F> {
    pub fn new(
        cache: Arc<C>,
        ledger: Arc<L>,
        feed: Arc<F>,
        settings: ReconcilerSettings,
        session: &SessionSettings,
    ) -> Self {
        let (status, _) = watch::channel(ReconcilerStatus::Starting);
        Self {
            cache,
            ledger,
            feed,
            settings,
            session_max_age: chrono::Duration::try_seconds(session.max_age),
            call_timeout: session.call_timeout(),
            status,
        }
    }

    pub fn health(&self) -> ReconcilerHealth {
        ReconcilerHealth {
            rx: self.status.subscribe(),
        }
    }

    fn set_status(&self, status: ReconcilerStatus) {
        self.status.send_replace(status);
    }

    /// Supervise the subscription until `shutdown` becomes true or its
    /// sender is dropped. Subscription failures back off and retry.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = self.settings.initial_backoff();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscription = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = bounded(self.call_timeout, "expiry subscribe", self.feed.subscribe()) => result,
            };

            match subscription {
                Ok(stream) => {
                    attempt = 0;
                    backoff = self.settings.initial_backoff();
                    self.set_status(ReconcilerStatus::Subscribed);
                    info!("Subscribed to session expiry notifications");

                    match self.consume(stream, &mut shutdown).await {
                        Flow::Shutdown => break,
                        Flow::Disconnected => warn!("Session expiry stream ended"),
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to subscribe to session expiry notifications");
                }
            }

            attempt = attempt.saturating_add(1);
            self.set_status(ReconcilerStatus::Reconnecting { attempt });
            warn!(
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Reconnecting to session expiry notifications"
            );

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.settings.max_backoff());
        }

        self.set_status(ReconcilerStatus::Stopped);
        info!("Expiry reconciler stopped");
    }

    async fn consume(&self, mut stream: ExpiryStream, shutdown: &mut watch::Receiver<bool>) -> Flow {
        self.sweep_logged().await;

        let period = self.settings.sweep_interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = wait_for_shutdown(shutdown) => return Flow::Shutdown,
                next = stream.next() => match next {
                    Some(id) => self.reconcile_logged(&id).await,
                    None => return Flow::Disconnected,
                },
                _ = ticker.tick() => self.sweep_logged().await,
            }
        }
    }

    async fn reconcile_logged(&self, id: &SessionId) {
        match self.handle_expired(id).await {
            Ok(ReconcileOutcome::Removed) => debug!(session = id.redacted(), "Reconciled expired session"),
            Ok(ReconcileOutcome::AlreadyGone) => debug!(session = id.redacted(), "Expired session had no ledger row"),
            Err(e) => warn!(session = id.redacted(), error = %e, "Failed to reconcile expired session"),
        }
    }

    /// Drop the ledger row of a lapsed session and prune its index entry.
    pub async fn handle_expired(&self, id: &SessionId) -> Result<ReconcileOutcome, SessionError> {
        let record = bounded(self.call_timeout, "ledger find", self.ledger.find_by_id(id)).await?;

        // The owner is only known through the ledger once the cache entry is gone
        if let Some(record) = &record {
            if let Err(e) = bounded(
                self.call_timeout,
                "cache index remove",
                self.cache.index_remove(&record.user_id, id),
            )
            .await
            {
                warn!(user_id = %record.user_id, session = id.redacted(), error = %e, "Failed to prune index entry");
            }
        }

        let deleted = bounded(self.call_timeout, "ledger delete", self.ledger.delete_by_id(id)).await?;

        Ok(if record.is_some() || deleted > 0 {
            ReconcileOutcome::Removed
        } else {
            ReconcileOutcome::AlreadyGone
        })
    }

    async fn sweep_logged(&self) {
        match self.sweep().await {
            Ok(0) => debug!("Ledger sweep found nothing to reconcile"),
            Ok(reconciled) => info!(reconciled, "Ledger sweep reconciled lapsed sessions"),
            Err(e) => warn!(error = %e, "Ledger sweep aborted"),
        }
    }

    /// Reconcile ledger rows older than the session lifetime whose token is
    /// no longer in the cache. Extended sessions stay untouched.
    pub async fn sweep(&self) -> Result<usize, SessionError> {
        // A lifetime reaching past the start of time leaves nothing lapsed
        let Some(cutoff) = self
            .session_max_age
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let batch = self.settings.sweep_batch_size.max(1);
        let mut cursor: Option<LedgerCursor> = None;
        let mut reconciled = 0;

        loop {
            let page = bounded(
                self.call_timeout,
                "ledger scan",
                self.ledger.list_created_before(cutoff, cursor.clone(), batch),
            )
            .await?;

            for record in &page.records {
                let live = bounded(self.call_timeout, "cache get", self.cache.get(&record.id)).await?;
                if live.is_none() {
                    self.handle_expired(&record.id).await?;
                    reconciled += 1;
                }
            }

            // Paging follows the scan position, not the record count
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(reconciled)
    }
}

/// A dropped sender counts as shutdown.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
