//! Expiry notification trait (port)

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::domain::SessionId;
use crate::error::SessionError;

/// Tokens whose cache entries lapsed. Ends when the subscription drops.
pub type ExpiryStream = BoxStream<'static, SessionId>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExpiryFeed: Send + Sync {
    async fn subscribe(&self) -> Result<ExpiryStream, SessionError>;
}
