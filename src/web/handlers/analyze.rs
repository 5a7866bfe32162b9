// POST /api/analyze_batch: run the full pipeline on a list of comments.
//
// Body: {"comments": [{"text": ..., ...}, ...]}
// 200 with {"analysis": {...}}, or {"error": ...} with 400 / 503 / 500.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, info};

use crate::analysis::models::{AnalysisReport, AnalysisResponse, AnalyzeRequest};
use crate::error::AnalysisError;
use crate::web::{error_response, AppState};

pub async fn analyze_batch(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected analyze_batch body");
            return error_response(&AnalysisError::InvalidInput(
                "expected a JSON object with a `comments` list".to_string(),
            ));
        }
    };

    info!(comments = request.comments.len(), "analyze_batch request");

    // Nothing to analyze needs no models
    if request.comments.iter().all(|c| c.usable_text().is_none()) {
        let empty = AnalysisResponse::from(AnalysisReport::default());
        return (StatusCode::OK, Json(empty)).into_response();
    }

    let analyzer = match state.analyzer().await {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };

    match analyzer.analyze(request.comments).await {
        Ok(report) => (StatusCode::OK, Json(AnalysisResponse::from(report))).into_response(),
        Err(e) => error_response(&e),
    }
}
