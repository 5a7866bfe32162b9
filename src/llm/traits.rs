// Generative-text trait. One call per non-noise cluster.
//
// Implementations are asked for JSON but are not trusted to honor it; the
// theme labeler parses their output leniently.

use anyhow::Result;
use async_trait::async_trait;

/// A text-in, text-out model that can be steered toward JSON output.
#[async_trait]
pub trait GenerativeText: Send + Sync {
    /// Send `prompt` in JSON response mode and return the raw response text.
    async fn generate_json(&self, prompt: &str) -> Result<String>;
}
