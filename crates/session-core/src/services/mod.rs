//! Lifecycle orchestration and background reconciliation

pub mod session_service;
pub mod expiry_reconciler;

pub use session_service::SessionService;
pub use expiry_reconciler::{ExpiryReconciler, ReconcileOutcome, ReconcilerHealth, ReconcilerStatus};

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::SessionError;

/// Run one store call under a deadline. An expired deadline abandons the
/// call and reports the store as unavailable.
pub(crate) async fn bounded<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, timeout_ms = limit.as_millis() as u64, "Session store call timed out");
            Err(SessionError::StoreUnavailable(format!("{} timed out", op)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_store_unavailable() {
        let result: Result<(), SessionError> = bounded(Duration::from_millis(10), "cache get", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert_eq!(
            result,
            Err(SessionError::StoreUnavailable("cache get timed out".into()))
        );
    }

    #[tokio::test]
    async fn test_bounded_passes_through_results() {
        let ok = bounded(Duration::from_secs(1), "op", async { Ok::<_, SessionError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = bounded(Duration::from_secs(1), "op", async {
            Err::<(), _>(SessionError::NotFound)
        })
        .await;
        assert_eq!(err, Err(SessionError::NotFound));
    }
}
