use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Liveness only: answering at all means the listener and runtime are up.
#[derive(Clone)]
pub struct HealthState {
    started_at: DateTime<Utc>,
}

impl HealthState {
    pub fn starting_now() -> Self {
        Self { started_at: Utc::now() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub started_at: String,
    pub uptime_secs: i64,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    let now = Utc::now();
    Json(HealthResponse {
        status: "ok",
        service: "imagine-server",
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        checked_at: now.to_rfc3339(),
    })
}
