// Batch analysis: the full comment pipeline for one request.
//
// Stages run in order: filter blank comments, classify sentiment, embed,
// reduce, cluster, label each cluster, rank keywords, pick out questions.
// Classification and embedding failures abort the batch; a failed cluster
// label never does.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{error, info};

use super::models::{AnalysisReport, Comment, SentimentEntry, Theme, ThemeComment};
use crate::config::Config;
use crate::error::AnalysisError;
use crate::keywords::ranking::{KeywordRanker, DEFAULT_TOP_N};
use crate::llm::gemini::GeminiClient;
use crate::models::download::{embedding_model_dir, sentiment_model_dir};
use crate::sentiment::onnx::OnnxSentimentClassifier;
use crate::sentiment::traits::{Classification, SentimentClassifier};
use crate::themes::cluster::{hdbscan, ClusterParams, NOISE};
use crate::themes::embeddings::SentenceEmbedder;
use crate::themes::labeler::ThemeLabeler;
use crate::themes::reduce::{neighbor_count, reduce, ReducerParams, MIN_NEIGHBORS};
use crate::themes::traits::TextEncoder;

/// Tunables for one analyzer.
#[derive(Debug, Clone)]
pub struct AnalysisParams {
    pub reducer: ReducerParams,
    pub cluster: ClusterParams,
    pub top_keywords: usize,
    /// Cluster labeling calls allowed in flight at once
    pub label_concurrency: usize,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            reducer: ReducerParams::default(),
            cluster: ClusterParams::default(),
            top_keywords: DEFAULT_TOP_N,
            label_concurrency: 4,
        }
    }
}

/// Runs the comment pipeline. Holds long-lived model handles, so build it
/// once and share it behind an Arc.
pub struct BatchAnalyzer {
    classifier: Arc<dyn SentimentClassifier>,
    encoder: Arc<dyn TextEncoder>,
    labeler: ThemeLabeler,
    ranker: KeywordRanker,
    params: AnalysisParams,
}

impl BatchAnalyzer {
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        encoder: Arc<dyn TextEncoder>,
        labeler: ThemeLabeler,
    ) -> Self {
        Self::with_params(classifier, encoder, labeler, AnalysisParams::default())
    }

    pub fn with_params(
        classifier: Arc<dyn SentimentClassifier>,
        encoder: Arc<dyn TextEncoder>,
        labeler: ThemeLabeler,
        params: AnalysisParams,
    ) -> Self {
        Self {
            classifier,
            encoder,
            labeler,
            ranker: KeywordRanker::new(params.top_keywords),
            params,
        }
    }

    /// Load both ONNX models and the Gemini client. Any missing piece is a
    /// ServiceUnavailable error carrying the reason.
    pub fn from_config(config: &Config) -> Result<Self, AnalysisError> {
        let unavailable = |e: anyhow::Error| AnalysisError::ServiceUnavailable(format!("{e:#}"));

        config.require_models().map_err(unavailable)?;
        config.require_llm().map_err(unavailable)?;

        let classifier = OnnxSentimentClassifier::load(&sentiment_model_dir(&config.model_dir))
            .map_err(unavailable)?;
        let encoder =
            SentenceEmbedder::load(&embedding_model_dir(&config.model_dir)).map_err(unavailable)?;
        let llm = GeminiClient::from_config(config).map_err(unavailable)?;

        info!(
            model_dir = %config.model_dir.display(),
            llm_model = %config.gemini_model,
            "Analysis services initialized"
        );

        let params = AnalysisParams {
            label_concurrency: config.label_concurrency,
            ..AnalysisParams::default()
        };

        Ok(Self::with_params(
            Arc::new(classifier),
            Arc::new(encoder),
            ThemeLabeler::new(Arc::new(llm), config.llm_timeout),
            params,
        ))
    }

    /// Analyze one batch of comments.
    pub async fn analyze(&self, comments: Vec<Comment>) -> Result<AnalysisReport, AnalysisError> {
        let received = comments.len();
        let retained: Vec<Comment> = comments
            .into_iter()
            .filter(|c| c.usable_text().is_some())
            .collect();

        if retained.is_empty() {
            info!(received, "No usable comments, returning empty analysis");
            return Ok(AnalysisReport::default());
        }

        let texts: Vec<String> = retained
            .iter()
            .filter_map(|c| c.usable_text().map(str::to_string))
            .collect();
        let n = texts.len();

        if neighbor_count(n, self.params.reducer.max_neighbors).is_none() {
            info!(retained = n, "Too few comments to cluster");
            return Err(AnalysisError::InsufficientData {
                retained: n,
                required: MIN_NEIGHBORS + 1,
            });
        }

        info!(received, retained = n, "Starting batch analysis");

        let classifications = self.classify(&texts).await?;
        let embeddings = self.embed(&texts).await?;

        let (labels, min_cluster_size) = self.cluster(embeddings).await?;

        // Ascending cluster id order; noise kept apart
        let mut groups: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
        for (i, &label) in labels.iter().enumerate() {
            if label != NOISE {
                groups.entry(label).or_default().push(i);
            }
        }

        info!(
            clusters = groups.len(),
            noise = labels.iter().filter(|&&l| l == NOISE).count(),
            min_cluster_size,
            "Clustering complete"
        );

        // buffered (not buffer_unordered) keeps results in cluster id order
        let theme_labels: Vec<_> = stream::iter(
            groups
                .iter()
                .map(|(&id, members)| {
                    let sample: Vec<&str> = members.iter().map(|&i| texts[i].as_str()).collect();
                    async move { self.labeler.label(id, &sample).await }
                })
                .collect::<Vec<_>>(),
        )
        .buffered(self.params.label_concurrency.max(1))
        .collect()
        .await;

        let sentiments: Vec<SentimentEntry> = texts
            .iter()
            .zip(&classifications)
            .map(|(text, c)| SentimentEntry {
                text: text.clone(),
                sentiment: c.sentiment,
                confidence: c.confidence,
            })
            .collect();

        // Each comment is moved out exactly once: into its theme or into
        // the unclustered list.
        let mut slots: Vec<Option<Comment>> = retained.into_iter().map(Some).collect();
        let mut themes = Vec::with_capacity(groups.len());
        for ((id, members), label) in groups.into_iter().zip(theme_labels) {
            let comments: Vec<ThemeComment> = members
                .into_iter()
                .filter_map(|i| {
                    slots[i]
                        .take()
                        .map(|c| ThemeComment::new(c, classifications[i]))
                })
                .collect();
            themes.push(Theme {
                theme_id: id,
                name: label.name,
                summary: label.summary,
                comment_count: comments.len(),
                comments,
            });
        }
        let unclustered: Vec<ThemeComment> = slots
            .into_iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|c| ThemeComment::new(c, classifications[i])))
            .collect();

        let keywords = themes.iter().map(|t| t.name.clone()).collect();
        let questions = extract_questions(&texts);
        let word_ranking = self.ranker.rank(&texts);

        info!(
            themes = themes.len(),
            unclustered = unclustered.len(),
            questions = questions.len(),
            ranked_words = word_ranking.len(),
            "Batch analysis complete"
        );

        Ok(AnalysisReport {
            sentiments,
            keywords,
            questions,
            themes,
            word_ranking,
            unclustered,
        })
    }

    async fn classify(&self, texts: &[String]) -> Result<Vec<Classification>, AnalysisError> {
        let classifications = self.classifier.classify_batch(texts).await.map_err(|e| {
            error!(error = %format!("{e:#}"), "Sentiment classification failed");
            AnalysisError::ServiceUnavailable(format!("sentiment classification failed: {e:#}"))
        })?;
        if classifications.len() != texts.len() {
            return Err(AnalysisError::Unexpected(anyhow::anyhow!(
                "Classifier returned {} results for {} texts",
                classifications.len(),
                texts.len()
            )));
        }
        info!(count = classifications.len(), "Sentiment classified");
        Ok(classifications)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, AnalysisError> {
        let embeddings = self.encoder.embed_batch(texts).await.map_err(|e| {
            error!(error = %format!("{e:#}"), "Embedding failed");
            AnalysisError::ServiceUnavailable(format!("embedding failed: {e:#}"))
        })?;
        if embeddings.len() != texts.len() {
            return Err(AnalysisError::Unexpected(anyhow::anyhow!(
                "Encoder returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        info!(
            count = embeddings.len(),
            dim = self.encoder.dimension(),
            "Comments embedded"
        );
        Ok(embeddings)
    }

    /// Reduce and cluster off the async runtime. Returns one label per
    /// text and the minimum cluster size used.
    async fn cluster(&self, embeddings: Vec<Vec<f64>>) -> Result<(Vec<i32>, usize), AnalysisError> {
        let reducer = self.params.reducer.clone();
        let min_cluster_size = self.params.cluster.min_cluster_size(embeddings.len());

        tokio::task::spawn_blocking(move || -> Result<(Vec<i32>, usize), AnalysisError> {
            let reduction = reduce(&embeddings, &reducer)?;
            info!(
                neighbors = reduction.n_neighbors,
                dim = reducer.n_components,
                "Embeddings reduced"
            );
            Ok((
                hdbscan(&reduction.embedding, min_cluster_size),
                min_cluster_size,
            ))
        })
        .await
        .map_err(|e| AnalysisError::Unexpected(anyhow::anyhow!("clustering task failed: {e}")))?
    }
}

/// Texts whose trimmed form ends with a question mark, in input order.
pub fn extract_questions(texts: &[String]) -> Vec<String> {
    texts
        .iter()
        .filter(|t| t.trim_end().ends_with('?'))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_questions_use_trimmed_suffix() {
        let texts = vec![
            "Why is this?".to_string(),
            "What mic is that?   ".to_string(),
            "Is it ? no".to_string(),
            "¿Qué?".to_string(),
            "Statement.".to_string(),
        ];
        assert_eq!(
            extract_questions(&texts),
            vec!["Why is this?", "What mic is that?   ", "¿Qué?"]
        );
    }

    #[test]
    fn test_default_params() {
        let p = AnalysisParams::default();
        assert_eq!(p.reducer.n_components, 20);
        assert_eq!(p.reducer.max_neighbors, 15);
        assert_eq!(p.cluster.min_cluster_floor, 5);
        assert_eq!(p.top_keywords, 50);
    }
}
