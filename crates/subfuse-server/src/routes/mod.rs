//! API route definitions

pub mod cache;
pub mod configurations;
pub mod pipeline;
pub mod sources;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::error::ServerResult;
use crate::state::AppState;

/// Build the `/api/v1` router
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/statistics", get(statistics))
        .nest("/sources", sources::routes())
        .nest("/configurations", configurations::routes())
        .nest("/pipeline", pipeline::routes())
        .nest("/cache", cache::routes())
}

/// Build the `/health` router
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    merger_initialized: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        merger_initialized: state.merger_initialized().await,
    })
}

async fn statistics(
    State(state): State<AppState>,
) -> ServerResult<Json<subfuse_pipeline::MergerStatistics>> {
    let merger = state.merger().await?;
    Ok(Json(merger.statistics().await))
}
