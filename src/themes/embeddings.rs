// Sentence embeddings using paraphrase-multilingual-MiniLM-L12-v2.
//
// Comments are embedded into 384-dimensional vectors so that semantically
// close comments ("ton micro grésille" / "the audio is crackling") land near
// each other even when they share no words or languages. These vectors feed
// the reducer, then the density clusterer.
//
// The model runs locally via ONNX. Mean pooling is applied to token
// embeddings, weighted by the attention mask (matching the model's training).

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::TextEncoder;
use crate::models::download::{MODEL_FILE, TOKENIZER_FILE};

/// Embedding dimension for paraphrase-multilingual-MiniLM-L12-v2.
pub const EMBEDDING_DIM: usize = 384;

/// The model was trained with sequences capped at 128 tokens.
const MAX_SEQ_LEN: usize = 128;

/// Texts per forward pass. Keeps padding waste and peak memory bounded on
/// videos with thousands of comments.
const BATCH_SIZE: usize = 64;

/// Sentence embedder using a local ONNX model.
///
/// Arc<Mutex<Session>> for thread safety, Arc<Tokenizer> for shared
/// ownership across spawn_blocking.
pub struct SentenceEmbedder {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
    pad_id: i64,
}

impl SentenceEmbedder {
    /// Load the sentence embedding model and tokenizer from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in the directory.
    /// Call `download_models()` first if they don't exist.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Embedding model not found: {}\nRun `commentsense download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Embedding tokenizer not found: {}\nRun `commentsense download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!(
                    "Failed to load embedding model from {}",
                    model_path.display()
                )
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load embedding tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer truncation: {}", e))?;

        // XLM-R vocab pads with "<pad>" (id 1), BERT vocabs with "[PAD]" (id 0)
        let pad_id = tokenizer
            .token_to_id("<pad>")
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0) as i64;

        debug!(
            pad_id = pad_id,
            "Loaded sentence embedding model from {}",
            model_dir.display()
        );

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
            pad_id,
        })
    }
}

#[async_trait]
impl TextEncoder for SentenceEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Embed a batch of texts into 384-dimensional vectors.
    ///
    /// CPU-bound work is offloaded to spawn_blocking to keep the async
    /// runtime responsive.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let pad_id = self.pad_id;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut all = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(BATCH_SIZE) {
                all.extend(embed_sync(&session, &tokenizer, pad_id, chunk)?);
            }
            Ok(all)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Synchronous embedding: runs tokenization, inference, and mean pooling.
/// Called from spawn_blocking to avoid blocking the async runtime.
fn embed_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    pad_id: i64,
    texts: &[String],
) -> Result<Vec<Vec<f64>>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(t.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    if max_len == 0 {
        return Ok(vec![vec![0.0; EMBEDDING_DIM]; batch_size]);
    }

    // input_ids padded with the vocab's pad id, attention_mask 0 on padding,
    // token_type_ids all zeros for single-sentence input
    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut token_type_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let seq_len = ids.len();

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, seq_len));

        let pad_len = max_len - seq_len;
        input_ids_flat.extend(std::iter::repeat_n(pad_id, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat.clone()))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    // Output is last_hidden_state: [batch, seq_len, 384]
    let hidden_states = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Embedding ONNX inference failed")?;

        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract embedding output tensor")?;

        data.to_vec()
    };

    if hidden_states.len() != batch_size * max_len * EMBEDDING_DIM {
        anyhow::bail!(
            "Embedding model returned {} values, expected {}",
            hidden_states.len(),
            batch_size * max_len * EMBEDDING_DIM
        );
    }

    let embeddings: Vec<Vec<f64>> = (0..batch_size)
        .map(|i| {
            let mask = &attention_mask_flat[i * max_len..(i + 1) * max_len];
            let hidden = &hidden_states[i * max_len * EMBEDDING_DIM..(i + 1) * max_len * EMBEDDING_DIM];
            mean_pool(hidden, mask, EMBEDDING_DIM)
        })
        .collect();

    debug!(
        batch_size = batch_size,
        dim = EMBEDDING_DIM,
        "Computed sentence embeddings"
    );

    Ok(embeddings)
}

/// Average token vectors weighted by the attention mask.
///
/// `hidden` is `[seq_len, dim]` flattened; `mask` has `seq_len` entries.
/// A fully-masked sequence yields the zero vector.
fn mean_pool(hidden: &[f32], mask: &[i64], dim: usize) -> Vec<f64> {
    let mut sum = vec![0.0_f64; dim];
    let mut mask_sum = 0.0_f64;

    for (token, &m) in hidden.chunks_exact(dim).zip(mask) {
        if m > 0 {
            let w = m as f64;
            mask_sum += w;
            for (acc, &v) in sum.iter_mut().zip(token) {
                *acc += v as f64 * w;
            }
        }
    }

    if mask_sum > 0.0 {
        for val in &mut sum {
            *val /= mask_sum;
        }
    }

    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // Two tokens of dim 3; second is padding
        let hidden = [1.0, 2.0, 3.0, 100.0, 100.0, 100.0];
        let mask = [1, 0];
        let pooled = mean_pool(&hidden, &mask, 3);
        assert_eq!(pooled, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mean_pool_averages_real_tokens() {
        let hidden = [1.0, 0.0, 3.0, 2.0];
        let mask = [1, 1];
        let pooled = mean_pool(&hidden, &mask, 2);
        assert!((pooled[0] - 2.0).abs() < 1e-10);
        assert!((pooled[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_mean_pool_all_masked_is_zero() {
        let hidden = [5.0, 5.0];
        let mask = [0];
        let pooled = mean_pool(&hidden, &mask, 2);
        assert!(pooled.iter().all(|&v| v == 0.0));
    }
}
