// Request and response types for batch analysis.
//
// Field names follow the JSON the front end already speaks: camelCase for
// comment and theme fields, snake_case for `word_ranking`. Comments keep any
// fields this crate does not read so they round-trip into theme listings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keywords::ranking::WordFrequency;
use crate::sentiment::traits::{Classification, Sentiment};

/// A comment as received from the comment source.
///
/// Only `text` is consumed; the rest is echoed back inside themes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<Value>,
    /// Fields this crate does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Comment {
    /// Comment with only a text, as most tests and the CLI build them.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// The text, unless it is missing or blank. Blank comments take no part
    /// in any analysis stage. Whitespace-only text counts as blank: "   "
    /// is neither classified nor embedded, and does not count toward the
    /// minimum batch size.
    pub fn usable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Body of a batch analysis request.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub comments: Vec<Comment>,
}

/// Sentiment of one retained comment, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentEntry {
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

/// A comment placed in a theme, annotated with its sentiment.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

impl ThemeComment {
    pub fn new(comment: Comment, classification: Classification) -> Self {
        Self {
            comment,
            sentiment: classification.sentiment,
            confidence: classification.confidence,
        }
    }
}

/// A named group of comments.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub theme_id: i32,
    pub name: String,
    pub summary: String,
    pub comment_count: usize,
    pub comments: Vec<ThemeComment>,
}

/// Everything produced for one batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub sentiments: Vec<SentimentEntry>,
    /// Theme names, in theme order
    pub keywords: Vec<String>,
    /// Retained texts whose trimmed form ends with '?'
    pub questions: Vec<String>,
    pub themes: Vec<Theme>,
    pub word_ranking: Vec<WordFrequency>,
    /// Retained comments that landed in the noise cluster
    pub unclustered: Vec<ThemeComment>,
}

/// Top-level response envelope: `{"analysis": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub analysis: AnalysisReport,
}

impl From<AnalysisReport> for AnalysisResponse {
    fn from(analysis: AnalysisReport) -> Self {
        Self { analysis }
    }
}
