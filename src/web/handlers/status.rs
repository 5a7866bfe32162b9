// GET /api/status: what the analyzer needs and whether it has loaded.
//
// Lets a front end tell "models missing" apart from "still cold" before it
// posts a large batch.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::download::{embedding_files_present, sentiment_files_present};
use crate::web::AppState;

pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;

    Json(serde_json::json!({
        "models": {
            "sentiment": sentiment_files_present(&config.model_dir),
            "embedding": embedding_files_present(&config.model_dir),
        },
        "llm_configured": config.require_llm().is_ok(),
        "llm_model": config.gemini_model,
        "analyzer_loaded": state.analyzer_ready(),
    }))
}
