// Corpus-wide keyword frequency ranking.
//
// Independent of sentiment and clustering: every retained text counts, and
// the result is a plain frequency table over non-stopword tokens.

pub mod ranking;
pub mod stopwords;
