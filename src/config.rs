use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default Gemini model used for theme labeling.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-lite";

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
    /// API key for the generative-text service (GEMINI_API_KEY)
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_api_url: String,
    /// Upper bound on a single theme labeling call
    pub llm_timeout: Duration,
    /// Request rate cap for the generative-text service
    pub llm_requests_per_second: f64,
    /// How many clusters may be labeled concurrently
    pub label_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default except the Gemini API key, which is only
    /// checked when the analysis services are built.
    pub fn load() -> Result<Self> {
        let model_dir = env::var("COMMENTSENSE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::models::download::default_model_dir());

        let llm_timeout_secs = parse_env("COMMENTSENSE_LLM_TIMEOUT_SECS", 30u64)?;
        let llm_requests_per_second = parse_env("COMMENTSENSE_LLM_RPS", 2.0f64)?;
        let label_concurrency = parse_env("COMMENTSENSE_LABEL_CONCURRENCY", 4usize)?;

        if llm_requests_per_second <= 0.0 {
            anyhow::bail!("COMMENTSENSE_LLM_RPS must be positive, got {llm_requests_per_second}");
        }

        Ok(Self {
            model_dir,
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| DEFAULT_GEMINI_API_URL.to_string()),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            llm_requests_per_second,
            label_concurrency: label_concurrency.max(1),
        })
    }

    /// Check that the generative-text service is configured.
    /// Theme labeling cannot run without it.
    pub fn require_llm(&self) -> Result<()> {
        if self.gemini_api_key.is_empty() {
            anyhow::bail!(
                "GEMINI_API_KEY not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    /// Check that both ONNX models have been downloaded.
    pub fn require_models(&self) -> Result<()> {
        if !crate::models::download::sentiment_files_present(&self.model_dir) {
            anyhow::bail!(
                "Sentiment model files not found in {}\n\
                 Run `commentsense download-model` to download them.",
                crate::models::download::sentiment_model_dir(&self.model_dir).display()
            );
        }
        if !crate::models::download::embedding_files_present(&self.model_dir) {
            anyhow::bail!(
                "Embedding model files not found in {}\n\
                 Run `commentsense download-model` to download them.",
                crate::models::download::embedding_model_dir(&self.model_dir).display()
            );
        }
        Ok(())
    }
}

/// Read an env var and parse it, falling back to `default` when unset.
/// A set-but-unparseable value is an error rather than a silent default.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key} ({raw:?}): {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_default_when_unset() {
        let v: u64 = parse_env("COMMENTSENSE_TEST_UNSET_VARIABLE", 17).unwrap();
        assert_eq!(v, 17);
    }

    #[test]
    fn test_require_llm_fails_without_key() {
        let config = Config {
            model_dir: PathBuf::from("/nonexistent"),
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            gemini_api_url: DEFAULT_GEMINI_API_URL.to_string(),
            llm_timeout: Duration::from_secs(30),
            llm_requests_per_second: 2.0,
            label_concurrency: 4,
        };
        assert!(config.require_llm().is_err());
        assert!(config.require_models().is_err());
    }
}
