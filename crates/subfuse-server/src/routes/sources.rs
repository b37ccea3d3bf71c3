//! Source registry endpoints

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use subfuse_core::SourceTier;
use subfuse_sources::SourceError;

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Routes under `/api/v1/sources`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sources).post(add_source))
        .route("/validate-urls", post(validate_urls))
}

/// One source as presented by the API
#[derive(Debug, Serialize)]
pub struct SourceView {
    url: String,
    tier: String,
    weight: f64,
    enabled: bool,
    blacklisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    blacklist_reason: Option<String>,
    success_rate: f64,
    avg_response_time_ms: f64,
}

async fn list_sources(State(state): State<AppState>) -> ServerResult<Json<Vec<SourceView>>> {
    let merger = state.merger().await?;
    let sources = merger.sources().get_all_sources().await;
    let views = sources
        .into_iter()
        .map(|source| SourceView {
            tier: source.tier.as_str().to_string(),
            weight: source.weight,
            enabled: source.enabled,
            blacklisted: source.blacklisted,
            blacklist_reason: source.blacklist_reason.clone(),
            success_rate: source.success_rate(),
            avg_response_time_ms: source.avg_response_time_ms(),
            url: source.url,
        })
        .collect();
    Ok(Json(views))
}

/// Body for `POST /sources`
#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    /// Subscription URL
    pub url: String,
    /// Tier name; defaults to experimental
    #[serde(default)]
    pub tier: Option<String>,
    /// Weight in [0, 1]
    #[serde(default)]
    pub weight: Option<f64>,
}

async fn add_source(
    State(state): State<AppState>,
    Json(request): Json<AddSourceRequest>,
) -> ServerResult<Json<serde_json::Value>> {
    let merger = state.merger().await?;
    let tier = match &request.tier {
        Some(name) => SourceTier::parse(name)
            .ok_or_else(|| ServerError::BadRequest(format!("unknown tier: {}", name)))?,
        None => SourceTier::Experimental,
    };

    merger
        .sources()
        .add_source(&request.url, tier, request.weight)
        .await
        .map_err(|e| match e {
            SourceError::Duplicate => ServerError::BadRequest(e.to_string()),
            SourceError::Invalid(_) => ServerError::BadRequest(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        })?;

    Ok(Json(serde_json::json!({
        "status": "added",
        "url": request.url,
        "tier": tier.as_str(),
    })))
}

/// Body for `POST /sources/validate-urls`
#[derive(Debug, Deserialize)]
pub struct ValidateUrlsRequest {
    /// URLs to check
    pub urls: Vec<String>,
}

/// Verdict for one checked URL
#[derive(Debug, Serialize)]
pub struct UrlVerdict {
    url: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// Response for `POST /sources/validate-urls`
#[derive(Debug, Serialize)]
pub struct ValidateUrlsResponse {
    checked: usize,
    results: Vec<UrlVerdict>,
}

async fn validate_urls(
    State(state): State<AppState>,
    Json(request): Json<ValidateUrlsRequest>,
) -> ServerResult<Json<ValidateUrlsResponse>> {
    let merger = state.merger().await?;
    let validator = merger.sources().validator();

    let results: Vec<UrlVerdict> = request
        .urls
        .iter()
        .map(|url| {
            let verdict = validator.check_url(url);
            UrlVerdict {
                url: url.clone(),
                valid: verdict.safe,
                reason: verdict.reason,
            }
        })
        .collect();

    Ok(Json(ValidateUrlsResponse {
        checked: results.len(),
        results,
    }))
}
