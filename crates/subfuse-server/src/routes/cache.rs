//! Cache administration endpoints

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Routes under `/api/v1/cache`
pub fn routes() -> Router<AppState> {
    Router::new().route("/clear", post(clear_cache))
}

async fn clear_cache(State(state): State<AppState>) -> ServerResult<Json<serde_json::Value>> {
    match &state.cache {
        Some(cache) => {
            cache
                .clear()
                .await
                .map_err(|e| ServerError::Internal(e.to_string()))?;
            Ok(Json(json!({ "status": "cleared" })))
        }
        None => Ok(Json(json!({ "status": "no cache configured" }))),
    }
}
