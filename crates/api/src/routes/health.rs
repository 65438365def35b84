//! Liveness probe mounted at the root, outside `/api/v1` and without auth.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `"ok"` when the database answers, `"degraded"` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    pub db_healthy: bool,
    /// Newest applied migration; `null` when the database is unreachable.
    pub schema_version: Option<i64>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let schema_version = match costkeeper_db::health_check(&state.pool).await {
        Ok(()) => costkeeper_db::schema_version(&state.pool).await.ok().flatten(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            None
        }
    };
    let db_healthy = schema_version.is_some();

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        schema_version,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
