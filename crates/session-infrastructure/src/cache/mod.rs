//! Cache module (Redis adapters)

pub mod connection;
pub mod session_cache_impl;
pub mod expiry_feed;

pub use connection::create_redis_pool;
pub use session_cache_impl::RedisSessionCache;
pub use expiry_feed::RedisExpiryFeed;
