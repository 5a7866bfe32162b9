// Bilingual (French + English) stopword set.
//
// English comes from the stop-words crate's NLTK list. Its apostrophe forms
// ("don't", "you're") are skipped: after punctuation stripping they would
// become real words like "dont" and "youre", and the bare stems ("don",
// "aren", "mustn") are already in the list. French is a fixed list of
// function words plus a few contractions as they look once apostrophes are
// gone ("c'est" becomes "cest").

use std::collections::HashSet;
use std::sync::LazyLock;

use stop_words::{get, LANGUAGE};

use super::ranking::normalize;

const FRENCH_STOPWORDS: &[&str] = &[
    "a", "à", "alors", "au", "aucuns", "aussi", "autre", "avant", "avec", "avoir", "bon", "car",
    "ce", "cela", "ces", "ceux", "chaque", "ci", "comme", "comment", "dans", "de", "des", "du",
    "dedans", "dehors", "depuis", "devrait", "doit", "donc", "dos", "début", "elle", "elles",
    "en", "encore", "essai", "est", "et", "eu", "fait", "faites", "fois", "font", "hors", "ici",
    "il", "ils", "je", "juste", "la", "le", "les", "leur", "là", "ma", "maintenant", "mais",
    "mes", "mien", "moins", "mon", "mot", "même", "ni", "nommés", "notre", "nous", "nouveaux",
    "ou", "où", "par", "parce", "pas", "peut", "peu", "plupart", "pour", "pourquoi", "quand",
    "que", "quel", "quelle", "quelles", "quels", "qui", "sa", "sans", "ses", "seulement", "si",
    "sien", "son", "sont", "sous", "soyez", "sujet", "sur", "ta", "tandis", "tellement", "tels",
    "tes", "ton", "tous", "tout", "trop", "très", "tu", "voient", "vont", "votre", "vous", "vu",
    "ça", "étaient", "état", "étions", "été", "être",
];

/// Apostrophe-stripped French contractions.
const CONTRACTIONS: &[&str] = &["cest", "jai", "sil", "quil", "dun", "une"];

static STOPWORDS: LazyLock<HashSet<String>> = LazyLock::new(|| {
    let english = get(LANGUAGE::English);
    english
        .iter()
        .filter(|w| !w.contains('\''))
        .map(|w| normalize(w))
        .chain(
            FRENCH_STOPWORDS
                .iter()
                .chain(CONTRACTIONS)
                .map(|w| normalize(w)),
        )
        .filter(|w| !w.is_empty())
        .collect()
});

/// True if `token` (already normalized) is a stopword.
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(token)
}

/// Number of distinct stopwords.
pub fn len() -> usize {
    STOPWORDS.len()
}
