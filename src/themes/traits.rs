// Text encoder trait: dense sentence embeddings for theme discovery.
//
// The default implementation is the local ONNX sentence embedder. Tests
// substitute deterministic fakes so the reducer and clusterer can be
// exercised without model files.

use anyhow::Result;
use async_trait::async_trait;

/// Maps texts to fixed-dimension dense vectors.
#[async_trait]
pub trait TextEncoder: Send + Sync {
    /// Length of every vector this encoder produces.
    fn dimension(&self) -> usize;

    /// Embed texts in order. Empty input yields empty output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>>;
}
