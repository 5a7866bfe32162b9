// System status display: model files on disk and LLM configuration.

use std::path::Path;

use colored::Colorize;

use crate::config::Config;
use crate::models::download::{
    embedding_files_present, embedding_model_dir, sentiment_files_present, sentiment_model_dir,
    MODEL_FILE,
};

/// Display readiness of everything `analyze` and `serve` need.
pub fn show(config: &Config) {
    println!("Model directory: {}", config.model_dir.display());

    show_model(
        "Sentiment model",
        &sentiment_model_dir(&config.model_dir),
        sentiment_files_present(&config.model_dir),
    );
    show_model(
        "Embedding model",
        &embedding_model_dir(&config.model_dir),
        embedding_files_present(&config.model_dir),
    );

    if config.require_llm().is_ok() {
        println!(
            "Theme labeling: {} ({}, timeout {}s, {} req/s)",
            "configured".green(),
            config.gemini_model,
            config.llm_timeout.as_secs(),
            config.llm_requests_per_second
        );
    } else {
        println!("Theme labeling: {}", "not configured".red());
        println!("  Set GEMINI_API_KEY in your .env file");
    }

    let ready = config.require_models().is_ok() && config.require_llm().is_ok();
    if ready {
        println!("\nReady to analyze.");
    } else {
        println!("\nNot ready: batch analysis will report the service as unavailable.");
    }
}

fn show_model(label: &str, dir: &Path, present: bool) {
    if present {
        let size = std::fs::metadata(dir.join(MODEL_FILE))
            .map(|m| format_bytes(m.len()))
            .unwrap_or_else(|_| "unknown".to_string());
        println!("{}: {} ({})", label, "present".green(), size);
    } else {
        println!("{}: {}", label, "missing".red());
        println!("  Run `commentsense download-model` to fetch it");
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(170 * 1024 * 1024), "170.0 MB");
    }
}
