//! Store traits (ports)

pub mod session_cache;
pub mod session_ledger;
pub mod expiry_feed;

pub use session_cache::{PutMode, SessionCache};
pub use session_ledger::SessionLedger;
pub use expiry_feed::{ExpiryFeed, ExpiryStream};

#[cfg(test)]
pub use expiry_feed::MockExpiryFeed;
#[cfg(test)]
pub use session_cache::MockSessionCache;
#[cfg(test)]
pub use session_ledger::MockSessionLedger;
