//! Domain entities

pub mod session;

pub use session::{user_index_key, LedgerCursor, LedgerPage, SessionId, SessionRecord};
