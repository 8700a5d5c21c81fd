//! PostgreSQL repository implementations

pub mod session_repo_impl;

pub use session_repo_impl::PgSessionLedger;
