// HTTP surface tests, driven through the router with tower's oneshot.
//
// Run with `--features web`.

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use commentsense::analysis::batch::BatchAnalyzer;
use commentsense::config::{Config, DEFAULT_GEMINI_API_URL, DEFAULT_GEMINI_MODEL};
use commentsense::llm::traits::GenerativeText;
use commentsense::sentiment::traits::{SentimentClassifier, StarRating};
use commentsense::themes::labeler::ThemeLabeler;
use commentsense::themes::traits::TextEncoder;
use commentsense::web::{build_router, AppState};

struct FourStars;

#[async_trait]
impl SentimentClassifier for FourStars {
    async fn rate_batch(&self, texts: &[String]) -> Result<Vec<StarRating>> {
        Ok(vec![StarRating { stars: 4, score: 0.7 }; texts.len()])
    }
}

struct LengthEncoder;

#[async_trait]
impl TextEncoder for LengthEncoder {
    fn dimension(&self) -> usize {
        4
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        Ok(texts
            .iter()
            .map(|t| vec![1.0, t.len() as f64 / 100.0, 0.1, 0.2])
            .collect())
    }
}

struct NoLlm;

#[async_trait]
impl GenerativeText for NoLlm {
    async fn generate_json(&self, _prompt: &str) -> Result<String> {
        anyhow::bail!("offline")
    }
}

/// Configuration pointing at an empty model directory with no API key.
fn unconfigured() -> Config {
    Config {
        model_dir: PathBuf::from("/nonexistent/commentsense-test-models"),
        gemini_api_key: String::new(),
        gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
        llm_timeout: Duration::from_secs(1),
        llm_requests_per_second: 1.0,
        label_concurrency: 2,
    }
}

fn ready_app() -> axum::Router {
    let analyzer = BatchAnalyzer::new(
        Arc::new(FourStars),
        Arc::new(LengthEncoder),
        ThemeLabeler::new(Arc::new(NoLlm), Duration::from_secs(1)),
    );
    build_router(AppState::with_analyzer(unconfigured(), analyzer))
}

fn cold_app() -> axum::Router {
    build_router(AppState::new(unconfigured()))
}

fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/analyze_batch")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let response = cold_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let response = ready_app().oneshot(post_json("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    let message = json["error"].as_str().unwrap();
    assert!(message.starts_with("invalid request:"), "{message}");
    assert!(message.contains("`comments`"), "{message}");
}

#[tokio::test]
async fn missing_comments_field_is_bad_request() {
    let response = ready_app()
        .oneshot(post_json(r#"{"videoId": "abc"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_comments_succeed_without_models() {
    let response = cold_app()
        .oneshot(post_json(r#"{"comments": []}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    for key in ["sentiments", "keywords", "questions", "themes", "word_ranking"] {
        assert_eq!(json["analysis"][key], serde_json::json!([]), "{key}");
    }
}

#[tokio::test]
async fn missing_models_is_service_unavailable() {
    let response = cold_app()
        .oneshot(post_json(r#"{"comments": [{"text": "hello there"}]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let json = json_body(response).await;
    let message = json["error"].as_str().unwrap();
    assert!(!message.contains("/nonexistent"), "leaked path: {message}");
}

#[tokio::test]
async fn too_few_comments_is_bad_request() {
    let response = ready_app()
        .oneshot(post_json(r#"{"comments": [{"text": "one"}, {"text": "two"}]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("not enough comments"));
}

#[tokio::test]
async fn small_batch_returns_analysis() {
    let response = ready_app()
        .oneshot(post_json(
            r#"{"comments": [
                {"text": "I love this", "author": "a"},
                {"text": "I hate this", "author": "b"},
                {"text": "Why is this?", "author": "c"},
                {"text": ""}
            ]}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    let analysis = &json["analysis"];
    assert_eq!(analysis["sentiments"].as_array().unwrap().len(), 3);
    assert_eq!(analysis["sentiments"][0]["sentiment"], "positif");
    assert_eq!(analysis["questions"], serde_json::json!(["Why is this?"]));
    assert!(analysis["word_ranking"].is_array());
}

#[tokio::test]
async fn status_reports_missing_pieces() {
    let response = cold_app()
        .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["models"]["sentiment"], false);
    assert_eq!(json["llm_configured"], false);
    assert_eq!(json["analyzer_loaded"], false);
}
