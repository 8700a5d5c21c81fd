//! # Session Server
//!
//! HTTP surface of the session process: liveness and readiness probes.
//! The expiry reconciler runs alongside it, see `main.rs`.

pub mod handlers;
pub mod state;

use axum::{routing::get, Router};

use handlers::health;
use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .with_state(state)
}
