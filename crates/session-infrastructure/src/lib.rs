//! # Session Infrastructure
//!
//! Store adapters: Postgres ledger, Redis cache and expiry feed, and
//! in-memory stand-ins for tests and single-process runs.

pub mod database;
pub mod cache;
pub mod memory;

pub use database::{create_pool, run_migrations, PgSessionLedger};
pub use cache::{create_redis_pool, RedisExpiryFeed, RedisSessionCache};
pub use memory::{MemorySessionCache, MemorySessionLedger};
