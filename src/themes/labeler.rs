// Theme labeling: ask the generative-text service to name a cluster.
//
// One call per non-noise cluster. The labeler never fails: any error
// (network, timeout, unparseable or incomplete JSON) turns into a default
// "Theme <id>" label whose summary names the cause, so a single bad response
// cannot sink the batch or touch other clusters.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::traits::GenerativeText;
use crate::output::truncate_chars;

/// Comments shown to the model per cluster, taken from the front of the
/// cluster in assignment order.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Longest cause text kept in a fallback summary.
const MAX_CAUSE_CHARS: usize = 200;

/// Name and one-sentence summary for a theme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeLabel {
    pub name: String,
    pub summary: String,
}

/// Why a labeling attempt produced no usable label.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("labeling request failed: {0}")]
    Request(anyhow::Error),

    #[error("labeling request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response contained no JSON object")]
    NoJsonObject,

    #[error("response JSON could not be decoded: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response field `{0}` was missing or empty")]
    EmptyField(&'static str),
}

#[derive(Deserialize)]
struct RawThemeLabel {
    #[serde(default)]
    theme_name: Option<String>,
    #[serde(default)]
    theme_summary: Option<String>,
}

/// Names clusters through a GenerativeText collaborator.
#[derive(Clone)]
pub struct ThemeLabeler {
    llm: Arc<dyn GenerativeText>,
    timeout: Duration,
}

impl ThemeLabeler {
    pub fn new(llm: Arc<dyn GenerativeText>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Label a cluster. Always returns a label; failures fall back to
    /// `Theme <cluster_id>` and are logged at warn.
    pub async fn label(&self, cluster_id: i32, texts: &[&str]) -> ThemeLabel {
        match self.try_label(texts).await {
            Ok(label) => {
                debug!(cluster_id, name = %label.name, "Theme labeled");
                label
            }
            Err(e) => {
                warn!(cluster_id, error = %e, "Theme labeling failed, using default label");
                fallback_label(cluster_id, &e)
            }
        }
    }

    /// One labeling attempt with the configured timeout.
    pub async fn try_label(&self, texts: &[&str]) -> Result<ThemeLabel, LabelError> {
        let prompt = build_prompt(texts, DEFAULT_SAMPLE_SIZE);
        let raw = tokio::time::timeout(self.timeout, self.llm.generate_json(&prompt))
            .await
            .map_err(|_| LabelError::Timeout(self.timeout))?
            .map_err(LabelError::Request)?;
        parse_theme_label(&raw)
    }
}

/// Instruction sent for one cluster. Lists the first `sample_size` texts.
pub fn build_prompt(texts: &[&str], sample_size: usize) -> String {
    let sample: Vec<String> = texts
        .iter()
        .take(sample_size)
        .map(|t| format!("- {}", t.trim()))
        .collect();

    format!(
        "The following viewer comments all belong to the same semantic group. \
         Identify the precise, specific topic that unites them: the most salient \
         and distinctive idea, not a generic heading such as \"Product feedback\" \
         or \"User questions\".\n\
         Answer ONLY with a JSON object of this exact form, with no other text:\n\
         {{\"theme_name\": \"a 2-4 word title capturing the central idea\", \
         \"theme_summary\": \"one sentence explaining the theme\"}}\n\
         Write both values in the language the comments are written in.\n\n\
         Comments:\n{}",
        sample.join("\n")
    )
}

/// Decode `{theme_name, theme_summary}` from the span between the first `{`
/// and the last `}` of `raw`, tolerating prose or code fences around it.
pub fn parse_theme_label(raw: &str) -> Result<ThemeLabel, LabelError> {
    let start = raw.find('{').ok_or(LabelError::NoJsonObject)?;
    let end = raw.rfind('}').ok_or(LabelError::NoJsonObject)?;
    if end <= start {
        return Err(LabelError::NoJsonObject);
    }

    let parsed: RawThemeLabel = serde_json::from_str(&raw[start..=end])?;

    let name = non_empty(parsed.theme_name).ok_or(LabelError::EmptyField("theme_name"))?;
    let summary = non_empty(parsed.theme_summary).ok_or(LabelError::EmptyField("theme_summary"))?;

    Ok(ThemeLabel { name, summary })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Default label for a cluster whose labeling failed.
pub fn fallback_label(cluster_id: i32, cause: &LabelError) -> ThemeLabel {
    ThemeLabel {
        name: format!("Theme {cluster_id}"),
        summary: format!(
            "No summary available: {}",
            truncate_chars(&cause.to_string(), MAX_CAUSE_CHARS)
        ),
    }
}
