use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use session_core::ReconcilerStatus;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub reconciler: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_attempt: Option<u32>,
}

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: state.service_name.clone(),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Ready only while expiry notifications are flowing.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let status = state.reconciler.status();
    let ready = state.reconciler.is_ready();
    let (label, reconnect_attempt) = match status {
        ReconcilerStatus::Starting => ("starting", None),
        ReconcilerStatus::Subscribed => ("subscribed", None),
        ReconcilerStatus::Reconnecting { attempt } => ("reconnecting", Some(attempt)),
        ReconcilerStatus::Stopped => ("stopped", None),
    };

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(ReadinessResponse {
            ready,
            reconciler: label,
            reconnect_attempt,
        }),
    )
}
