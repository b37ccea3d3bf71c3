//! Pipeline execution endpoints

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

use subfuse_jobs::{Job, JobType};
use subfuse_pipeline::{parse_formats, PipelineError};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Routes under `/api/v1/pipeline`
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/run", post(run_pipeline))
        .route("/status/:job_id", get(job_status))
}

/// Body for `POST /pipeline/run`
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Settings file override (recorded on the job)
    #[serde(default)]
    pub config_path: Option<String>,
    /// Where output files land
    pub output_dir: PathBuf,
    /// Formats to emit
    pub formats: Vec<String>,
}

async fn run_pipeline(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> ServerResult<(StatusCode, Json<serde_json::Value>)> {
    let merger = state.merger().await?;

    let formats = parse_formats(&request.formats).map_err(|e| match e {
        PipelineError::UnsupportedFormats(_) => ServerError::BadRequest(e.to_string()),
        other => ServerError::Internal(other.to_string()),
    })?;

    let parameters = json!({
        "config_path": request.config_path,
        "output_dir": request.output_dir,
        "formats": request.formats,
    });

    let output_dir = request.output_dir.clone();
    let job_id = state
        .jobs
        .submit(JobType::Process, parameters, move |ctx| async move {
            let progress = ctx.clone();
            let report = merger
                .run(
                    &formats,
                    &output_dir,
                    &ctx.cancel,
                    Some(std::sync::Arc::new(move |value, message: &str| {
                        let progress = progress.clone();
                        let message = message.to_string();
                        tokio::spawn(async move {
                            progress.progress(value, &message).await;
                        });
                    })),
                )
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(report).map_err(|e| e.to_string())
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id, "status": "accepted" })),
    ))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ServerResult<Json<Job>> {
    state
        .jobs
        .get_job(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Job not found: {}", job_id)))
}
