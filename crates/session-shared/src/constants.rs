//! Application-wide constants

/// Random bytes behind every session token (256 bits).
pub const SESSION_TOKEN_BYTES: usize = 32;
/// Length of a token once encoded as unpadded URL-safe base64.
pub const SESSION_TOKEN_LEN: usize = 43;

/// Cache key prefix for `token -> user_id` entries.
pub const SESSION_KEY_PREFIX: &str = "session:";
/// Cache key prefix for the per-user sorted set of tokens.
pub const USER_INDEX_KEY_PREFIX: &str = "user_sessions:";

pub const DEFAULT_COOKIE_NAME: &str = "X-Session-ID";
pub const DEFAULT_SESSION_MAX_AGE: i64 = 86400;
/// Ten years. Keeps `now + max_age` inside the representable time range.
pub const MAX_SESSION_MAX_AGE: i64 = 315_360_000;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CREATE_ATTEMPTS: u32 = 3;

pub const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 500;
pub const MAX_RECONNECT_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 500;
