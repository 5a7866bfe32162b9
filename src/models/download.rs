// Model download helper for the two ONNX models the pipeline runs locally.
//
// 1. bert-base-multilingual-uncased-sentiment: 1-5 star sentiment (~170MB quantized)
// 2. paraphrase-multilingual-MiniLM-L12-v2: sentence embeddings (~470MB)
//
// Files land in a platform-appropriate directory
// (~/.local/share/commentsense/models/ on Linux) so they persist across runs.
// Each model gets its own subdirectory holding `model.onnx` + `tokenizer.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// Local file names inside each model subdirectory.
pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Where a model lives on HuggingFace and where it goes locally.
struct RemoteModel {
    label: &'static str,
    subdir: &'static str,
    base_url: &'static str,
    remote_model_path: &'static str,
    approx_size: &'static str,
}

const SENTIMENT_MODEL: RemoteModel = RemoteModel {
    label: "Sentiment model (bert-base-multilingual-uncased-sentiment)",
    subdir: "bert-base-multilingual-uncased-sentiment",
    base_url: "https://huggingface.co/Xenova/bert-base-multilingual-uncased-sentiment/resolve/main",
    remote_model_path: "onnx/model_quantized.onnx",
    approx_size: "~170 MB",
};

const EMBEDDING_MODEL: RemoteModel = RemoteModel {
    label: "Sentence embedding model (paraphrase-multilingual-MiniLM-L12-v2)",
    subdir: "paraphrase-multilingual-MiniLM-L12-v2",
    base_url:
        "https://huggingface.co/sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2/resolve/main",
    remote_model_path: "onnx/model.onnx",
    approx_size: "~470 MB",
};

/// Returns the default directory for storing model files.
/// Uses the platform data directory: ~/.local/share/commentsense/models/ on Linux.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("commentsense")
        .join("models")
}

/// Subdirectory within model_dir for the sentiment classifier.
pub fn sentiment_model_dir(base: &Path) -> PathBuf {
    base.join(SENTIMENT_MODEL.subdir)
}

/// Subdirectory within model_dir for the sentence embedder.
pub fn embedding_model_dir(base: &Path) -> PathBuf {
    base.join(EMBEDDING_MODEL.subdir)
}

/// Check whether both sentiment model files exist.
pub fn sentiment_files_present(base: &Path) -> bool {
    files_present(&sentiment_model_dir(base))
}

/// Check whether both embedding model files exist.
pub fn embedding_files_present(base: &Path) -> bool {
    files_present(&embedding_model_dir(base))
}

fn files_present(dir: &Path) -> bool {
    dir.join(MODEL_FILE).exists() && dir.join(TOKENIZER_FILE).exists()
}

/// Download both ONNX models.
///
/// Shows progress bars for the large files and skips anything already on disk.
pub async fn download_models(base: &Path) -> Result<()> {
    std::fs::create_dir_all(base)
        .with_context(|| format!("Failed to create model directory: {}", base.display()))?;

    for model in [&SENTIMENT_MODEL, &EMBEDDING_MODEL] {
        download_one(base, model).await?;
    }

    Ok(())
}

async fn download_one(base: &Path, model: &RemoteModel) -> Result<()> {
    println!("\n{}:", model.label);

    let dir = base.join(model.subdir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    let tokenizer_path = dir.join(TOKENIZER_FILE);
    if tokenizer_path.exists() {
        info!(model = model.subdir, "Tokenizer already exists, skipping");
        println!("  {TOKENIZER_FILE} (already exists)");
    } else {
        println!("  Downloading {TOKENIZER_FILE}...");
        download_file(
            &format!("{}/{}", model.base_url, TOKENIZER_FILE),
            &tokenizer_path,
            false,
        )
        .await?;
    }

    let model_path = dir.join(MODEL_FILE);
    if model_path.exists() {
        info!(model = model.subdir, "Model already exists, skipping");
        println!("  {MODEL_FILE} (already exists)");
    } else {
        println!("  Downloading {} ({})...", MODEL_FILE, model.approx_size);
        download_file(
            &format!("{}/{}", model.base_url, model.remote_model_path),
            &model_path,
            true,
        )
        .await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        let pb = match response.content_length() {
            Some(size) => {
                let pb = ProgressBar::new(size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .context("Invalid progress bar template")?
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("    {spinner} {bytes}")
                        .context("Invalid progress spinner template")?,
                );
                pb
            }
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    // Write to a temp name first so an interrupted download never looks complete
    let partial = dest.with_extension("partial");
    std::fs::write(&partial, &bytes)
        .with_context(|| format!("Failed to write {}", partial.display()))?;
    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move download into {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dir_is_under_commentsense() {
        let dir = default_model_dir();
        let path_str = dir.to_string_lossy();
        assert!(
            path_str.contains("commentsense") && path_str.contains("models"),
            "Expected path containing commentsense/models, got: {path_str}"
        );
    }

    #[test]
    fn test_model_dirs_are_distinct_subdirectories() {
        let base = PathBuf::from("/tmp/test-models");
        let s = sentiment_model_dir(&base);
        let e = embedding_model_dir(&base);
        assert!(s.starts_with(&base));
        assert!(e.starts_with(&base));
        assert_ne!(s, e);
    }

    #[test]
    fn test_files_present_false_when_empty() {
        let dir = std::env::temp_dir().join("commentsense-test-nonexistent");
        assert!(!sentiment_files_present(&dir));
        assert!(!embedding_files_present(&dir));
    }

    #[test]
    fn test_embedding_files_present_true_when_files_exist() {
        let dir = std::env::temp_dir().join("commentsense-embed-test");
        let embed_dir = embedding_model_dir(&dir);
        std::fs::create_dir_all(&embed_dir).unwrap();
        std::fs::write(embed_dir.join(MODEL_FILE), b"fake").unwrap();
        std::fs::write(embed_dir.join(TOKENIZER_FILE), b"fake").unwrap();

        assert!(embedding_files_present(&dir));
        assert!(!sentiment_files_present(&dir));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
