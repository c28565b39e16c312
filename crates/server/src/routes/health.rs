use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub git_commit: &'static str,
    pub build_timestamp: &'static str,
    pub database_ready: bool,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ready = sqlx::query("SELECT 1")
        .fetch_one(state.pool())
        .await
        .is_ok();

    Json(HealthResponse {
        status: if database_ready { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        git_commit: option_env!("ORBIT_GIT_COMMIT").unwrap_or("unknown"),
        build_timestamp: option_env!("ORBIT_BUILD_TIMESTAMP").unwrap_or("unknown"),
        database_ready,
    })
}
