// Local ONNX sentiment classifier using nlptown's multilingual star-rating BERT.
//
// Runs on the local CPU with no network dependency. The model was trained on
// product reviews in six languages (incl. French and English), which suits
// YouTube comment sections that mix both.
//
// Model: nlptown/bert-base-multilingual-uncased-sentiment (ONNX export)
// Output: 5 logits, one per star rating. Softmax gives the probabilities.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::debug;

use super::traits::{SentimentClassifier, StarRating};
use crate::models::download::{MODEL_FILE, TOKENIZER_FILE};

/// Number of star classes the model emits.
const NUM_STARS: usize = 5;

/// Maximum model input length. Texts are cut to this many *characters*
/// before tokenization. Character count only approximates token count, so
/// the tokenizer also truncates to the same number of tokens.
pub const MAX_INPUT_CHARS: usize = 512;

/// BERT pad token id.
const PAD_ID: i64 = 0;

/// Local ONNX-based sentiment classifier.
///
/// Same layout as the embedder: the session sits behind Arc<Mutex> because
/// `Session::run` takes &mut self and inference runs inside spawn_blocking.
pub struct OnnxSentimentClassifier {
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxSentimentClassifier {
    /// Load the ONNX model and tokenizer from the given directory.
    ///
    /// Expects `model.onnx` and `tokenizer.json` in `model_dir`.
    /// Call `download::download_models()` first if they don't exist.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(MODEL_FILE);
        let tokenizer_path = model_dir.join(TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Sentiment model not found: {}\nRun `commentsense download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Sentiment tokenizer not found: {}\nRun `commentsense download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| {
                format!("Failed to load sentiment model from {}", model_path.display())
            })?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load sentiment tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_INPUT_CHARS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure tokenizer truncation: {}", e))?;

        debug!("Loaded ONNX sentiment model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl SentimentClassifier for OnnxSentimentClassifier {
    /// Batch inference: truncate, tokenize, one forward pass, softmax,
    /// argmax. CPU-bound work runs in spawn_blocking.
    async fn rate_batch(&self, texts: &[String]) -> Result<Vec<StarRating>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || rate_sync(&session, &tokenizer, &texts))
            .await
            .context("spawn_blocking panicked")?
    }
}

fn rate_sync(
    session: &Arc<Mutex<Session>>,
    tokenizer: &Arc<Tokenizer>,
    texts: &[String],
) -> Result<Vec<StarRating>> {
    let encodings: Vec<_> = texts
        .iter()
        .map(|t| {
            tokenizer
                .encode(truncate_for_model(t, MAX_INPUT_CHARS), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))
        })
        .collect::<Result<Vec<_>>>()?;

    let batch_size = encodings.len();
    let max_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0)
        .max(1);

    let mut input_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut attention_mask_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);
    let mut token_type_ids_flat: Vec<i64> = Vec::with_capacity(batch_size * max_len);

    for enc in &encodings {
        let ids = enc.get_ids();
        let mask = enc.get_attention_mask();
        let pad_len = max_len - ids.len();

        input_ids_flat.extend(ids.iter().map(|&id| id as i64));
        attention_mask_flat.extend(mask.iter().map(|&m| m as i64));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, ids.len()));

        input_ids_flat.extend(std::iter::repeat_n(PAD_ID, pad_len));
        attention_mask_flat.extend(std::iter::repeat_n(0i64, pad_len));
        token_type_ids_flat.extend(std::iter::repeat_n(0i64, pad_len));
    }

    let shape = [batch_size as i64, max_len as i64];

    let input_ids_tensor =
        Tensor::from_array((shape, input_ids_flat)).context("Failed to create input_ids tensor")?;
    let attention_mask_tensor = Tensor::from_array((shape, attention_mask_flat))
        .context("Failed to create attention_mask tensor")?;
    let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids_flat))
        .context("Failed to create token_type_ids tensor")?;

    let logits = {
        let mut session = session
            .lock()
            .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            })
            .context("Sentiment ONNX inference failed")?;

        // Output shape: [batch_size, 5]
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract sentiment output tensor")?;

        data.to_vec()
    };

    if logits.len() != batch_size * NUM_STARS {
        anyhow::bail!(
            "Sentiment model returned {} logits, expected {}",
            logits.len(),
            batch_size * NUM_STARS
        );
    }

    let ratings: Vec<StarRating> = texts
        .iter()
        .zip(logits.chunks_exact(NUM_STARS))
        .map(|(text, row)| {
            let rating = rating_from_logits(row);
            debug!(
                stars = rating.stars,
                score = rating.score,
                text_preview = %crate::output::truncate_chars(text, 50),
                "Rated text"
            );
            rating
        })
        .collect();

    Ok(ratings)
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_for_model(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Numerically stable softmax.
fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&l| (l as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Pick the most probable star. Ties go to the lower star.
fn rating_from_logits(row: &[f32]) -> StarRating {
    let probs = softmax(row);
    let (idx, score) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, p)| {
            if p > best.1 {
                (i, p)
            } else {
                best
            }
        });
    StarRating {
        stars: (idx + 1) as u8,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-10);
        assert!(probs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let probs = softmax(&[1000.0, 0.0, 0.0, 0.0, 0.0]);
        assert!((probs[0] - 1.0).abs() < 1e-10);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_rating_picks_argmax_star() {
        let rating = rating_from_logits(&[-2.0, -1.0, 0.5, 3.0, 1.0]);
        assert_eq!(rating.stars, 4);
        assert!(rating.score > 0.5 && rating.score <= 1.0);
    }

    #[test]
    fn test_rating_one_star() {
        let rating = rating_from_logits(&[4.0, 1.0, 0.0, -1.0, -2.0]);
        assert_eq!(rating.stars, 1);
    }

    #[test]
    fn test_truncate_for_model_short_text_untouched() {
        assert_eq!(truncate_for_model("hello", 512), "hello");
    }

    #[test]
    fn test_truncate_for_model_counts_chars_not_bytes() {
        let text = "é".repeat(600);
        let cut = truncate_for_model(&text, MAX_INPUT_CHARS);
        assert_eq!(cut.chars().count(), MAX_INPUT_CHARS);
        assert_eq!(cut.len(), MAX_INPUT_CHARS * 2);
    }

    #[test]
    fn test_truncate_for_model_exact_boundary() {
        let text = "a".repeat(MAX_INPUT_CHARS);
        assert_eq!(truncate_for_model(&text, MAX_INPUT_CHARS), text);
    }
}
