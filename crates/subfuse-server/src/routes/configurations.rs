//! Configuration query endpoint

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use subfuse_core::{Protocol, VpnConfig};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Routes under `/api/v1/configurations`
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_configurations))
}

/// Query parameters for the paginated listing
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Page size
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Page offset
    #[serde(default)]
    pub offset: usize,
    /// Filter by protocol name
    #[serde(default)]
    pub protocol: Option<String>,
    /// Filter by annotated location
    #[serde(default)]
    pub location: Option<String>,
    /// Minimum quality score
    #[serde(default)]
    pub min_quality: Option<f64>,
}

fn default_limit() -> usize {
    100
}

/// Paginated response; `total` counts matches before pagination
#[derive(Debug, Serialize)]
pub struct ListResponse {
    total: usize,
    limit: usize,
    offset: usize,
    configurations: Vec<VpnConfig>,
}

async fn list_configurations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ServerResult<Json<ListResponse>> {
    let merger = state.merger().await?;

    let protocol = match &params.protocol {
        Some(name) => Some(
            Protocol::parse(name)
                .ok_or_else(|| ServerError::BadRequest(format!("unknown protocol: {}", name)))?,
        ),
        None => None,
    };

    let matches: Vec<VpnConfig> = merger
        .last_configurations()
        .iter()
        .filter(|config| protocol.map(|p| config.protocol == p).unwrap_or(true))
        .filter(|config| {
            params
                .location
                .as_deref()
                .map(|wanted| location_matches(config, wanted))
                .unwrap_or(true)
        })
        .filter(|config| {
            params
                .min_quality
                .map(|min| config.quality_score >= min)
                .unwrap_or(true)
        })
        .cloned()
        .collect();

    let total = matches.len();
    let configurations = matches
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .collect();

    Ok(Json(ListResponse {
        total,
        limit: params.limit,
        offset: params.offset,
        configurations,
    }))
}

fn location_matches(config: &VpnConfig, wanted: &str) -> bool {
    ["location", "geo", "country"].iter().any(|key| {
        config
            .metadata
            .get(*key)
            .and_then(|v| v.as_str())
            .map(|v| v.eq_ignore_ascii_case(wanted))
            .unwrap_or(false)
    })
}
