//! # Session Shared
//!
//! Configuration, telemetry, constants and small shared types for the
//! session lifecycle crates.

pub mod constants;
pub mod types;
pub mod telemetry;
pub mod config;
pub mod error;

pub use types::*;
pub use error::AppError;
