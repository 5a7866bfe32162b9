// Google Gemini implementation of GenerativeText.
//
// Uses the REST generateContent endpoint with responseMimeType set to
// application/json. The model usually complies, but the caller still has to
// cope with prose around the object, so this client returns the raw text.
//
// API docs: https://ai.google.dev/api/generate-content

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::GenerativeText;
use crate::config::Config;

/// Gemini REST client.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    rate_limiter: RateLimiter,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        api_url: String,
        model: String,
        timeout: Duration,
        requests_per_second: f64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
            rate_limiter: RateLimiter::new(requests_per_second),
        })
    }

    /// Build a client from configuration. Fails when no API key is set.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.require_llm()?;
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_api_url.clone(),
            config.gemini_model.clone(),
            config.llm_timeout,
            config.llm_requests_per_second,
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }
}

#[async_trait]
impl GenerativeText for GeminiClient {
    async fn generate_json(&self, prompt: &str) -> Result<String> {
        self.rate_limiter.acquire().await;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to call Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Gemini API returned {}: {}",
                status,
                crate::output::truncate_chars(&body, 300)
            );
        }

        let result: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini API response")?;

        let text = response_text(&result)?;

        debug!(
            model = %self.model,
            response_len = text.len(),
            "Gemini response received"
        );

        Ok(text)
    }
}

/// Concatenate the text parts of the first candidate. An empty answer is an
/// error, reported with the block reason when the prompt was filtered.
fn response_text(response: &GenerateResponse) -> Result<String> {
    let text: String = response
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect()
        })
        .unwrap_or_default();

    if !text.trim().is_empty() {
        return Ok(text);
    }

    match response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        Some(reason) => anyhow::bail!("Gemini blocked the request: {reason}"),
        None => anyhow::bail!("Gemini returned an empty response"),
    }
}

// --- Gemini API request/response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}
