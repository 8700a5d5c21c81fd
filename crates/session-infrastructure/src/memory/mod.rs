//! In-process store adapters
//!
//! Same contracts as the Redis and Postgres adapters, for tests. Nothing
//! expires in the background: lapsed cache entries are evicted (and
//! published) only when touched, forced with `expire`, or purged with
//! `purge_expired`.

pub mod session_cache;
pub mod session_ledger;

pub use session_cache::MemorySessionCache;
pub use session_ledger::MemorySessionLedger;
