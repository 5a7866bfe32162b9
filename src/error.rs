// Error taxonomy for a batch analysis request.
//
// Leaf components report failures with anyhow; the orchestrator folds them
// into AnalysisError so the HTTP layer and the CLI can pick a status code
// without inspecting error strings.

use thiserror::Error;

/// Request-scoped failure of a batch analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required model or collaborator could not be initialized, or a
    /// corpus-wide stage (classification, embedding) failed.
    #[error("analysis service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Malformed or missing request fields.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Too few usable comments to build a neighborhood graph.
    #[error(
        "not enough comments to identify themes: {retained} usable, at least {required} needed"
    )]
    InsufficientData { retained: usize, required: usize },

    /// Anything else. Logged in full, reported to callers generically.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl AnalysisError {
    /// HTTP status code for this error class.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalysisError::ServiceUnavailable(_) => 503,
            AnalysisError::InvalidInput(_) | AnalysisError::InsufficientData { .. } => 400,
            AnalysisError::Unexpected(_) => 500,
        }
    }

    /// Message safe to hand to an external caller. Initialization and
    /// unexpected failures carry paths and library errors, so callers get a
    /// fixed sentence and the detail goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            AnalysisError::ServiceUnavailable(_) => {
                "The analysis service is not fully initialized".to_string()
            }
            AnalysisError::Unexpected(_) => {
                "Internal server error during batch analysis".to_string()
            }
            other => other.to_string(),
        }
    }
}
