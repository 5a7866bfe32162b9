// Web server: Axum JSON API in front of the batch analyzer.
//
// Models load lazily on the first analysis request and are then shared by
// every later request. A failed load is reported as 503 and retried on the
// next request, so the server can start before models are downloaded.

use std::sync::Arc;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::analysis::batch::BatchAnalyzer;
use crate::config::Config;
use crate::error::AnalysisError;

pub mod handlers;

/// Large comment sections (several thousand comments with replies) run to a
/// few megabytes of JSON.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state threaded through all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    analyzer: Arc<OnceCell<Arc<BatchAnalyzer>>>,
}

impl AppState {
    /// State whose analyzer is built from `config` on first use.
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            analyzer: Arc::new(OnceCell::new()),
        }
    }

    /// State with a ready-made analyzer (tests, embedding in other services).
    pub fn with_analyzer(config: Config, analyzer: BatchAnalyzer) -> Self {
        Self {
            config: Arc::new(config),
            analyzer: Arc::new(OnceCell::new_with(Some(Arc::new(analyzer)))),
        }
    }

    /// Whether the analyzer has been built yet.
    pub fn analyzer_ready(&self) -> bool {
        self.analyzer.initialized()
    }

    /// The shared analyzer, loading models on first call. Loading is
    /// blocking work, so it runs on the blocking pool.
    pub async fn analyzer(&self) -> Result<Arc<BatchAnalyzer>, AnalysisError> {
        self.analyzer
            .get_or_try_init(|| async {
                let config = Arc::clone(&self.config);
                let analyzer = tokio::task::spawn_blocking(move || BatchAnalyzer::from_config(&config))
                    .await
                    .map_err(|e| {
                        AnalysisError::Unexpected(anyhow::anyhow!("model loading task failed: {e}"))
                    })??;
                Ok(Arc::new(analyzer))
            })
            .await
            .cloned()
    }
}

/// Start the Axum web server and block until it exits.
pub async fn run_server(config: Config, port: u16, bind: &str) -> Result<()> {
    let state = AppState::new(config);
    let app = build_router(state);

    let addr = format!("{bind}:{port}");
    info!("CommentSense API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(handlers::status::get_status))
        .route(
            "/api/analyze_batch",
            post(handlers::analyze::analyze_batch),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness probe. Does not touch the models.
async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "ok" })),
    )
}

/// Typed JSON error response helper.
pub fn api_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(serde_json::json!({ "error": message }))).into_response()
}

/// Map an analysis failure to `{"error": ...}` with its status code. Server
/// side failures are logged in full; callers only see the public message.
pub fn error_response(err: &AnalysisError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %format!("{err:#}"), "Batch analysis failed");
    }
    api_error(status, &err.public_message())
}
