// Sentiment classifier trait: the swap-ready abstraction.
//
// The underlying model is ordinal (1-5 stars). The pipeline only ever sees
// three classes; the mapping lives here so every backend shares it.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw ordinal output of a star-rating model for one text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarRating {
    /// 1 through 5
    pub stars: u8,
    /// Model probability for the chosen star, 0.0 to 1.0
    pub score: f64,
}

/// Three-way sentiment label. Serialized with the French wire labels the
/// front end expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentiment {
    #[serde(rename = "négatif")]
    Negative,
    #[serde(rename = "neutre")]
    Neutral,
    #[serde(rename = "positif")]
    Positive,
}

impl Sentiment {
    /// Collapse a star count into three classes:
    /// 1-2 → negative, 3 → neutral, 4-5 → positive.
    ///
    /// Out-of-range values clamp to the nearest end of the scale so the
    /// mapping stays total.
    pub fn from_stars(stars: u8) -> Self {
        match stars {
            0..=2 => Sentiment::Negative,
            3 => Sentiment::Neutral,
            _ => Sentiment::Positive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "négatif",
            Sentiment::Neutral => "neutre",
            Sentiment::Positive => "positif",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sentiment label plus the model's confidence in it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub sentiment: Sentiment,
    /// Probability the model reported for its chosen star, not remapped
    pub confidence: f64,
}

impl From<StarRating> for Classification {
    fn from(rating: StarRating) -> Self {
        Self {
            sentiment: Sentiment::from_stars(rating.stars),
            confidence: rating.score,
        }
    }
}

/// Trait for star-rating sentiment models. Async because inference is
/// offloaded from the runtime (or, for remote backends, is an HTTP call).
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Rate every text, returning results in the same order and of the
    /// same length as the input.
    async fn rate_batch(&self, texts: &[String]) -> Result<Vec<StarRating>>;

    /// Rate and collapse to three classes.
    async fn classify_batch(&self, texts: &[String]) -> Result<Vec<Classification>> {
        let ratings = self.rate_batch(texts).await?;
        if ratings.len() != texts.len() {
            anyhow::bail!(
                "Sentiment classifier returned {} results for {} texts",
                ratings.len(),
                texts.len()
            );
        }
        Ok(ratings.into_iter().map(Classification::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_mapping_is_exact() {
        assert_eq!(Sentiment::from_stars(1), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(2), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_stars(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_stars(5), Sentiment::Positive);
    }

    #[test]
    fn test_star_mapping_clamps_out_of_range() {
        assert_eq!(Sentiment::from_stars(0), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(9), Sentiment::Positive);
    }

    #[test]
    fn test_wire_labels() {
        assert_eq!(
            serde_json::to_string(&Sentiment::Negative).unwrap(),
            "\"négatif\""
        );
        assert_eq!(serde_json::to_string(&Sentiment::Neutral).unwrap(), "\"neutre\"");
        assert_eq!(
            serde_json::to_string(&Sentiment::Positive).unwrap(),
            "\"positif\""
        );
    }

    #[test]
    fn test_confidence_is_not_remapped() {
        let c = Classification::from(StarRating {
            stars: 2,
            score: 0.37,
        });
        assert_eq!(c.sentiment, Sentiment::Negative);
        assert!((c.confidence - 0.37).abs() < f64::EPSILON);
    }

    struct ShortClassifier;

    #[async_trait]
    impl SentimentClassifier for ShortClassifier {
        async fn rate_batch(&self, _texts: &[String]) -> Result<Vec<StarRating>> {
            Ok(vec![StarRating {
                stars: 5,
                score: 0.9,
            }])
        }
    }

    #[tokio::test]
    async fn test_classify_batch_rejects_length_mismatch() {
        let texts = vec!["a".to_string(), "b".to_string()];
        let result = ShortClassifier.classify_batch(&texts).await;
        assert!(result.is_err());
    }
}
