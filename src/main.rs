use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use commentsense::analysis::batch::BatchAnalyzer;
use commentsense::analysis::models::{AnalysisResponse, AnalyzeRequest};
use commentsense::config::Config;

/// CommentSense: sentiment, themes and keywords for a video's comments.
///
/// Classifies every comment, groups comments into discussion themes named
/// by an LLM, and ranks the words viewers use most.
#[derive(Parser)]
#[command(name = "commentsense", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the ONNX sentiment and embedding models (~640 MB)
    DownloadModel,

    /// Analyze a batch of comments from a JSON file
    Analyze {
        /// File holding {"comments": [{"text": ...}, ...]}
        input: PathBuf,

        /// Print the raw JSON response instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show model and LLM configuration status
    Status,

    /// Run the HTTP API
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "5000")]
        port: u16,

        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("commentsense=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DownloadModel => {
            let config = Config::load()?;
            let model_dir = &config.model_dir;

            println!("Downloading ONNX models...");
            println!("  Destination: {}", model_dir.display());

            commentsense::models::download::download_models(model_dir).await?;

            println!("\n{}", "Models downloaded successfully.".bold());
            println!("You can now run `commentsense analyze comments.json`.");
        }

        Commands::Analyze { input, json } => {
            let config = Config::load()?;

            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let request: AnalyzeRequest = serde_json::from_str(&raw).with_context(|| {
                format!(
                    "{} is not a valid request: expected {{\"comments\": [...]}}",
                    input.display()
                )
            })?;

            info!(
                comments = request.comments.len(),
                "Loaded comments from {}",
                input.display()
            );

            let analyzer = tokio::task::spawn_blocking(move || BatchAnalyzer::from_config(&config))
                .await
                .context("model loading task failed")??;

            let report = analyzer.analyze(request.comments).await?;

            if json {
                let response = AnalysisResponse::from(report);
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                commentsense::output::terminal::display_report(&report);
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            commentsense::status::show(&config);
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            commentsense::web::run_server(config, port, &bind).await?;
        }
    }

    Ok(())
}
