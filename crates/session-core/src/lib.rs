//! # Session Core
//!
//! Session domain types, store ports, the lifecycle service and the
//! expiry reconciler.

pub mod domain;
pub mod services;
pub mod repositories;
pub mod error;

// Re-export domain entities
pub use domain::*;
pub use error::SessionError;
pub use repositories::{ExpiryFeed, ExpiryStream, PutMode, SessionCache, SessionLedger};
pub use services::{ExpiryReconciler, ReconcilerHealth, ReconcilerStatus, SessionService};
