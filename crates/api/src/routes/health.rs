use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Which annotation store is active (`postgres` or `memory`).
    pub store: &'static str,
    /// Whether the database is reachable. Always true for the memory store.
    pub db_healthy: bool,
    pub rooms: usize,
    pub clients: usize,
}

/// GET /health -- returns service, store, and room health.
async fn health_check(State(state): State<AppState>) -> Json<DataResponse<HealthResponse>> {
    let (store, db_healthy) = match &state.pool {
        Some(pool) => ("postgres", cantor_db::health_check(pool).await.is_ok()),
        None => ("memory", true),
    };

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(DataResponse::ok(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store,
        db_healthy,
        rooms: state.rooms.room_count().await,
        clients: state.rooms.client_count().await,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
