//! Text normalization and n-gram generation.
//!
//! Embeddings are always computed on normalized text (accents stripped,
//! lowercased, punctuation removed) while evidence is displayed in the
//! topic's original wording, so every n-gram carries both forms.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::UnicodeSegmentation;

/// English and (accent-stripped) Vietnamese function words.
const STOPWORDS: &[&str] = &[
    // English
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "in",
    "into", "is", "it", "its", "of", "on", "or", "our", "that", "the", "their", "this", "to",
    "using", "use", "via", "was", "we", "what", "which", "with", "will", "based", "system",
    "application", "project", "topic", "study", "develop", "development", "build", "building",
    // Vietnamese
    "va", "cua", "cho", "cac", "nhung", "mot", "la", "co", "duoc", "trong", "voi", "de", "nay",
    "tu", "theo", "ve", "khi", "tai", "nhu", "cung", "da", "se", "thi", "ma", "bang", "tren",
    "duoi", "qua", "hay", "hoac", "viec", "nguoi", "he", "thong", "ung", "dung", "xay", "dung",
    "phat", "trien", "nghien", "cuu", "de", "tai",
];

/// Longest n-gram window, in words.
pub const MAX_NGRAM_WORDS: usize = 3;

/// Shortest word that can carry meaning on its own.
const MIN_MEANINGFUL_LEN: usize = 3;

/// An n-gram in both its display and embedding forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NGram {
    /// Words as written in the source.
    pub original: String,

    /// Normalized form, used as the embedding cache key.
    pub normalized: String,

    pub word_count: usize,
}

/// Normalizes text and splits it into n-grams.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: HashSet<String>,
    max_ngram_words: usize,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextNormalizer {
    /// Create a normalizer with the built-in stopword list.
    pub fn new() -> Self {
        Self {
            stopwords: STOPWORDS.iter().map(|s| (*s).to_string()).collect(),
            max_ngram_words: MAX_NGRAM_WORDS,
        }
    }

    /// Add extra stopwords (normalized before insertion).
    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords.extend(
            words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty()),
        );
        self
    }

    /// Whether a normalized word is a stopword.
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Normalize `text`. See [`normalize`].
    pub fn normalize(&self, text: &str) -> String {
        normalize(text)
    }

    /// All 1..=3 word windows of `text`, in source order, deduplicated by
    /// normalized form (first occurrence wins).
    pub fn ngrams(&self, text: &str) -> Vec<NGram> {
        let words: Vec<(&str, String)> = text
            .unicode_words()
            .map(|w| (w, normalize(w)))
            .filter(|(_, n)| !n.is_empty())
            .collect();

        let mut seen = HashSet::new();
        let mut grams = Vec::new();
        for start in 0..words.len() {
            for len in 1..=self.max_ngram_words {
                let Some(window) = words.get(start..start + len) else {
                    break;
                };
                let normalized = window
                    .iter()
                    .map(|(_, n)| n.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                if !seen.insert(normalized.clone()) {
                    continue;
                }
                let original = window.iter().map(|(w, _)| *w).collect::<Vec<_>>().join(" ");
                grams.push(NGram {
                    original,
                    normalized,
                    word_count: len,
                });
            }
        }
        grams
    }

    /// Whether a token can serve as evidence.
    ///
    /// Rejects tokens made only of stopwords, tokens without any part of
    /// at least three characters, and tokens without a letter.
    pub fn is_meaningful_token(&self, token: &str) -> bool {
        let normalized = normalize(token);
        let parts: Vec<&str> = normalized.split_whitespace().collect();
        if parts.is_empty() {
            return false;
        }
        if parts.iter().all(|p| self.is_stopword(p)) {
            return false;
        }
        if !parts
            .iter()
            .any(|p| p.chars().count() >= MIN_MEANINGFUL_LEN)
        {
            return false;
        }
        normalized.chars().any(char::is_alphabetic)
    }
}

/// Decompose accents, drop combining marks, lowercase and replace
/// punctuation with single spaces. Idempotent.
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| match c {
            // Vietnamese đ has no decomposition.
            'đ' => 'd',
            c if c.is_alphanumeric() => c,
            _ => ' ',
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_strips_accents_and_punctuation() {
        assert_eq!(
            normalize("Ứng dụng Blockchain: quản lý chuỗi cung ứng!"),
            "ung dung blockchain quan ly chuoi cung ung"
        );
        assert_eq!(normalize("Đà Nẵng -- IoT/AI"), "da nang iot ai");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Hệ thống gợi ý người phản biện",
            "Café, naïve résumé; ÆON",
            "İstanbul ǅemal ﬁnance",
            "Machine-Learning (ML) & NLP...",
            "",
        ];
        for s in samples {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_ngrams_keep_alignment() {
        let normalizer = TextNormalizer::new();
        let grams = normalizer.ngrams("Chuỗi cung ứng, Blockchain");

        let pairs: Vec<(&str, &str)> = grams
            .iter()
            .map(|g| (g.original.as_str(), g.normalized.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Chuỗi", "chuoi"),
                ("Chuỗi cung", "chuoi cung"),
                ("Chuỗi cung ứng", "chuoi cung ung"),
                ("cung", "cung"),
                ("cung ứng", "cung ung"),
                ("cung ứng Blockchain", "cung ung blockchain"),
                ("ứng", "ung"),
                ("ứng Blockchain", "ung blockchain"),
                ("Blockchain", "blockchain"),
            ]
        );
        assert_eq!(grams[2].word_count, 3);
    }

    #[test]
    fn test_ngrams_deduplicate_normalized_forms() {
        let normalizer = TextNormalizer::new();
        let grams = normalizer.ngrams("Data data DATA");
        let normalized: Vec<&str> = grams.iter().map(|g| g.normalized.as_str()).collect();
        assert_eq!(normalized, vec!["data", "data data", "data data data"]);
    }

    #[test]
    fn test_meaningful_tokens() {
        let normalizer = TextNormalizer::new();
        assert!(normalizer.is_meaningful_token("supply chain"));
        assert!(normalizer.is_meaningful_token("of blockchain"));
        assert!(!normalizer.is_meaningful_token("of the"));
        assert!(!normalizer.is_meaningful_token("và của"));
        assert!(!normalizer.is_meaningful_token("ai ml"));
        assert!(!normalizer.is_meaningful_token("2024 500"));
        assert!(!normalizer.is_meaningful_token("!!!"));
    }

    #[test]
    fn test_extra_stopwords() {
        let normalizer = TextNormalizer::new().with_stopwords(["Capstone"]);
        assert!(!normalizer.is_meaningful_token("capstone"));
    }
}
