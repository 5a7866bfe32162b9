// Word frequency ranking over the retained comment texts.
//
// Tokens are lowercased, stripped of ASCII punctuation and split on
// whitespace. Tokens of two characters or fewer and stopwords are dropped.
// Equal counts keep first-occurrence order, so the same input always gives
// the same list.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeTuple, Serializer};
use tracing::debug;

use super::stopwords::is_stopword;

/// Default number of entries in a ranking.
pub const DEFAULT_TOP_N: usize = 50;

/// Tokens must be longer than this (in characters) to count.
const MIN_TOKEN_CHARS: usize = 2;

/// One ranking entry. Serialized as a `[word, count]` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordFrequency {
    pub word: String,
    pub count: usize,
}

impl Serialize for WordFrequency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.word)?;
        tuple.serialize_element(&self.count)?;
        tuple.end()
    }
}

/// Lowercase and remove ASCII punctuation. Accented letters and other
/// non-ASCII characters are kept.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect()
}

/// Tokens of `text` that count toward the ranking, in order.
pub fn tokenize(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|t| t.chars().count() > MIN_TOKEN_CHARS && !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Frequency ranker with a fixed output length.
#[derive(Debug, Clone)]
pub struct KeywordRanker {
    pub top_n: usize,
}

impl Default for KeywordRanker {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl KeywordRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    /// Most frequent tokens across `texts`, highest count first.
    pub fn rank<S: AsRef<str>>(&self, texts: &[S]) -> Vec<WordFrequency> {
        // word -> (count, position of first occurrence)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut seen = 0usize;

        for text in texts {
            for token in tokenize(text.as_ref()) {
                let entry = counts.entry(token).or_insert((0, seen));
                entry.0 += 1;
                seen += 1;
            }
        }

        let mut ranked: Vec<(String, usize, usize)> = counts
            .into_iter()
            .map(|(word, (count, first))| (word, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(self.top_n);

        debug!(
            texts = texts.len(),
            tokens = seen,
            ranked = ranked.len(),
            "Ranked keywords"
        );

        ranked
            .into_iter()
            .map(|(word, count, _)| WordFrequency { word, count })
            .collect()
    }
}
