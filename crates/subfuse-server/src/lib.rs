//! # Subfuse Server
//!
//! The HTTP surface: `/health` plus the versioned `/api/v1` API for
//! sources, configurations, pipeline jobs, and cache administration.
//! Endpoints that need the merger return 503 until initialization
//! completes.

#![warn(clippy::all)]

pub mod error;
pub mod routes;
pub mod state;

use axum::http::{HeaderValue, Method};
use axum::Router;
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ServerError, ServerResult};
pub use state::AppState;

/// Server binding and CORS configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Allowed CORS origins; empty means any
    pub allowed_origins: Vec<String>,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Read `API_HOST`, `API_PORT`, and `ALLOWED_ORIGINS` from the
    /// environment, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("API_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        config
    }
}

/// Build the application router with all routes and middleware
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = build_cors_layer(config);

    Router::new()
        .nest("/api/v1", routes::api_routes())
        .nest("/health", routes::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(cors)
}

fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    if config.allowed_origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Bind and serve until shutdown
pub async fn serve(state: AppState, config: ServerConfig) -> ServerResult<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Internal(format!("invalid host/port: {}", e)))?;

    let app = build_router(state, &config);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::Internal(format!("failed to bind {}: {}", addr, e)))?;

    info!(addr = %addr, "API server listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| ServerError::Internal(format!("server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use tower::ServiceExt;

    use subfuse_core::SecurityValidator;
    use subfuse_fetch::{Fetcher, FetcherConfig, RateLimitConfig, RetryPolicy};
    use subfuse_jobs::{JobManager, JobManagerConfig};
    use subfuse_parsers::ParserBank;
    use subfuse_pipeline::{Merger, MergerConfig, Processor};
    use subfuse_sources::SourceManager;

    async fn test_state(dir: &tempfile::TempDir, with_merger: bool) -> AppState {
        let jobs = JobManager::new(dir.path().join("jobs.json"), JobManagerConfig::default())
            .await
            .unwrap();
        let state = AppState::new(jobs, None);

        if with_merger {
            let fetcher_config = FetcherConfig {
                retry: RetryPolicy::no_retry(),
                rate_limit: RateLimitConfig {
                    period: StdDuration::from_millis(1),
                    burst: nonzero_ext::nonzero!(50u32),
                },
                ..Default::default()
            };
            let merger = Arc::new(Merger::new(
                Arc::new(SourceManager::new(SecurityValidator::default())),
                Arc::new(Fetcher::new(fetcher_config).unwrap()),
                Arc::new(ParserBank::default()),
                Processor::new(SecurityValidator::default()),
                MergerConfig::default(),
            ));
            state.set_merger(merger).await;
        }
        state
    }

    async fn request(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, false).await;
        let router = build_router(state.clone(), &ServerConfig::default());

        let (status, body) = request(router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["merger_initialized"], false);
    }

    #[tokio::test]
    async fn test_503_before_initialization() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, false).await;

        for uri in ["/api/v1/statistics", "/api/v1/sources", "/api/v1/configurations"] {
            let router = build_router(state.clone(), &ServerConfig::default());
            let (status, body) = request(router, get(uri)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
            assert_eq!(body["detail"], "Merger not initialized");
        }
    }

    #[tokio::test]
    async fn test_add_source_then_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;

        let body = json!({"url": "https://configs.example.com/sub", "tier": "premium"});
        let router = build_router(state.clone(), &ServerConfig::default());
        let (status, _) = request(router, post("/api/v1/sources", body.clone())).await;
        assert_eq!(status, StatusCode::OK);

        let router = build_router(state.clone(), &ServerConfig::default());
        let (status, response) = request(router, post("/api/v1/sources", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["detail"], "Source already exists");

        let router = build_router(state, &ServerConfig::default());
        let (status, list) = request(router, get("/api/v1/sources")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validate_urls() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let router = build_router(state, &ServerConfig::default());

        let body = json!({"urls": ["https://ok.example.com/sub", "ftp://bad.example.com/sub"]});
        let (status, response) =
            request(router, post("/api/v1/sources/validate-urls", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["checked"], 2);
        assert_eq!(response["results"][0]["valid"], true);
        assert_eq!(response["results"][1]["valid"], false);
        assert!(response["results"][1]["reason"].is_string());
    }

    #[tokio::test]
    async fn test_pipeline_run_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let router = build_router(state, &ServerConfig::default());

        let body = json!({
            "output_dir": dir.path().join("out"),
            "formats": ["json", "bogus"],
        });
        let (status, response) = request(router, post("/api/v1/pipeline/run", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response["detail"]
            .as_str()
            .unwrap()
            .contains("Unsupported formats"));
    }

    #[tokio::test]
    async fn test_pipeline_run_accepted_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;

        let body = json!({
            "output_dir": dir.path().join("out"),
            "formats": ["json"],
        });
        let router = build_router(state.clone(), &ServerConfig::default());
        let (status, response) = request(router, post("/api/v1/pipeline/run", body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response["status"], "accepted");
        let job_id = response["job_id"].as_str().unwrap().to_string();

        let router = build_router(state, &ServerConfig::default());
        let (status, job) =
            request(router, get(&format!("/api/v1/pipeline/status/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["id"], job_id.as_str());
    }

    #[tokio::test]
    async fn test_unknown_job_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let router = build_router(state, &ServerConfig::default());

        let (status, _) = request(router, get("/api/v1/pipeline/status/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cache_clear_without_cache() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let router = build_router(state, &ServerConfig::default());

        let (status, _) = request(router, post("/api/v1/cache/clear", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_configurations_pagination_params() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, true).await;
        let router = build_router(state, &ServerConfig::default());

        let (status, body) =
            request(router, get("/api/v1/configurations?limit=10&offset=0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["configurations"].as_array().unwrap().len(), 0);
    }
}
