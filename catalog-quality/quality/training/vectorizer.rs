use std::{
    collections::{HashMap, HashSet},
    sync::OnceLock,
};

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::stopwords::ENGLISH_STOP_WORDS;
use crate::error::{PipelineError, Result};

const TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

fn token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is a valid regex"))
}

/// Stop-word list applied before n-grams are formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopWords {
    /// Built-in English list.
    #[default]
    English,
    /// Keep every token.
    None,
}

/// Vectorizer settings. Defaults match the baseline model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerConfig {
    /// Vocabulary cap, ranked by corpus frequency.
    pub max_features: usize,
    /// Inclusive n-gram range.
    pub ngram_range: (usize, usize),
    /// Minimum number of training documents a term must appear in.
    pub min_df: usize,
    /// Maximum share of training documents a term may appear in.
    pub max_df: f64,
    /// Stop words removed before n-grams are built.
    pub stop_words: StopWords,
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: 40_000,
            ngram_range: (1, 2),
            min_df: 5,
            max_df: 0.9,
            stop_words: StopWords::English,
        }
    }
}

impl VectorizerConfig {
    /// Rejects settings the vectorizer cannot honour.
    pub fn validate(&self) -> Result<()> {
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(PipelineError::InvalidConfig(format!(
                "ngram_range must satisfy 1 <= min <= max, got ({lo}, {hi})"
            )));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_df must lie in (0, 1], got {}",
                self.max_df
            )));
        }
        if self.max_features == 0 {
            return Err(PipelineError::InvalidConfig("max_features must be positive".into()));
        }
        Ok(())
    }
}

/// Sparse row: `(column, value)` pairs ordered by column.
pub type SparseRow = Vec<(usize, f64)>;

/// Fitted TF-IDF vectorizer over unigrams and bigrams.
///
/// Term frequencies are raw counts, IDF is smoothed (`ln((1 + n) / (1 + df)) + 1`) and each row is
/// scaled to unit L2 norm. The vocabulary is frozen at fit time; unseen terms are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: VectorizerConfig,
    vocabulary: IndexMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Learns vocabulary and IDF weights from training documents only.
    pub fn fit<S: AsRef<str>>(config: VectorizerConfig, documents: &[S]) -> Result<Self> {
        config.validate()?;
        let n_docs = documents.len();
        let max_doc_count = config.max_df * n_docs as f64;
        if max_doc_count < config.min_df as f64 {
            return Err(PipelineError::InvalidConfig(format!(
                "max_df={} keeps terms in at most {max_doc_count} of {n_docs} documents, \
                 fewer than min_df={}",
                config.max_df, config.min_df
            )));
        }

        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut corpus_frequency: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let terms = analyze(&config, doc.as_ref());
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
            for term in terms {
                *corpus_frequency.entry(term).or_default() += 1;
            }
        }

        let mut kept: Vec<(String, usize)> = document_frequency
            .into_iter()
            .filter(|(_, df)| *df >= config.min_df && *df as f64 <= max_doc_count)
            .collect();
        if kept.len() > config.max_features {
            kept.sort_by(|(a, _), (b, _)| corpus_frequency[b].cmp(&corpus_frequency[a]).then(a.cmp(b)));
            kept.truncate(config.max_features);
        }
        if kept.is_empty() {
            return Err(PipelineError::EmptyVocabulary {
                min_df: config.min_df,
                max_df: config.max_df,
            });
        }
        kept.sort_by(|(a, _), (b, _)| a.cmp(b));

        let mut vocabulary = IndexMap::with_capacity(kept.len());
        let mut idf = Vec::with_capacity(kept.len());
        for (idx, (term, df)) in kept.into_iter().enumerate() {
            idf.push(((1.0 + n_docs as f64) / (1.0 + df as f64)).ln() + 1.0);
            vocabulary.insert(term, idx);
        }
        Ok(Self {
            config,
            vocabulary,
            idf,
        })
    }

    /// Maps documents onto the frozen vocabulary.
    #[must_use]
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Vec<SparseRow> {
        documents
            .iter()
            .map(|doc| self.transform_one(doc.as_ref()))
            .collect()
    }

    /// Maps a single document onto the frozen vocabulary.
    #[must_use]
    pub fn transform_one(&self, document: &str) -> SparseRow {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for term in analyze(&self.config, document) {
            if let Some(&column) = self.vocabulary.get(&term) {
                *counts.entry(column).or_default() += 1.0;
            }
        }
        let mut row: SparseRow = counts
            .into_iter()
            .map(|(column, tf)| (column, tf * self.idf[column]))
            .collect();
        row.sort_unstable_by_key(|(column, _)| *column);
        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in &mut row {
                *value /= norm;
            }
        }
        row
    }

    /// Learned terms in column order (alphabetical).
    #[must_use]
    pub const fn vocabulary(&self) -> &IndexMap<String, usize> {
        &self.vocabulary
    }

    /// IDF weight per column.
    #[must_use]
    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Number of text columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    /// True when the vocabulary is empty (never the case for a fitted vectorizer).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Settings the vectorizer was fitted with.
    #[must_use]
    pub const fn config(&self) -> &VectorizerConfig {
        &self.config
    }
}

/// Lowercases, tokenizes, drops stop words, then emits the configured n-grams.
fn analyze(config: &VectorizerConfig, document: &str) -> Vec<String> {
    let lowered = document.to_lowercase();
    let tokens: Vec<&str> = token_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| match config.stop_words {
            StopWords::English => !ENGLISH_STOP_WORDS.contains(token),
            StopWords::None => true,
        })
        .collect();
    let (lo, hi) = config.ngram_range;
    let mut terms = Vec::new();
    for n in lo..=hi {
        if n > tokens.len() {
            break;
        }
        terms.extend(tokens.windows(n).map(|window| window.join(" ")));
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loose() -> VectorizerConfig {
        VectorizerConfig {
            min_df: 1,
            max_df: 1.0,
            ..VectorizerConfig::default()
        }
    }

    #[test]
    fn stop_words_drop_before_bigrams() {
        let terms = analyze(&VectorizerConfig::default(), "The Steel bottle, and a LID!");
        assert_eq!(
            terms,
            vec!["steel", "bottle", "lid", "steel bottle", "bottle lid"]
        );
    }

    #[test]
    fn single_character_tokens_are_skipped() {
        let terms = analyze(&loose(), "x 2 ml 500ml");
        assert_eq!(terms, vec!["ml", "500ml", "ml 500ml"]);
    }

    #[test]
    fn document_frequency_bounds_prune_terms() {
        let docs = ["mug steel", "mug glass", "mug steel", "mug copper"];
        let config = VectorizerConfig {
            min_df: 2,
            max_df: 0.9,
            ngram_range: (1, 1),
            ..VectorizerConfig::default()
        };
        let vectorizer = TfidfVectorizer::fit(config, &docs).unwrap();
        let terms: Vec<&str> = vectorizer.vocabulary().keys().map(String::as_str).collect();
        assert_eq!(terms, vec!["steel"]);
    }

    #[test]
    fn cap_keeps_most_frequent_terms_in_alphabetical_columns() {
        let docs = ["zinc zinc zinc oak", "zinc ash ash", "oak oak"];
        let config = VectorizerConfig {
            max_features: 2,
            ngram_range: (1, 1),
            ..loose()
        };
        let vectorizer = TfidfVectorizer::fit(config, &docs).unwrap();
        assert_eq!(vectorizer.vocabulary().get("ash"), None);
        assert_eq!(vectorizer.vocabulary().get("oak"), Some(&0));
        assert_eq!(vectorizer.vocabulary().get("zinc"), Some(&1));
    }

    #[test]
    fn rows_are_unit_norm_with_smoothed_idf() {
        let docs = ["steel mug", "steel kettle"];
        let config = VectorizerConfig {
            ngram_range: (1, 1),
            ..loose()
        };
        let vectorizer = TfidfVectorizer::fit(config, &docs).unwrap();
        let steel = vectorizer.vocabulary()["steel"];
        assert!((vectorizer.idf()[steel] - 1.0).abs() < 1e-12);
        let mug = vectorizer.vocabulary()["mug"];
        assert!((vectorizer.idf()[mug] - ((3.0_f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
        let row = vectorizer.transform_one("steel mug mug");
        let norm: f64 = row.iter().map(|(_, v)| v * v).sum();
        assert!((norm - 1.0).abs() < 1e-12);
    }

    #[test]
    fn unseen_terms_give_empty_row() {
        let vectorizer = TfidfVectorizer::fit(loose(), &["steel mug"]).unwrap();
        assert!(vectorizer.transform_one("walnut tray").is_empty());
    }

    #[test]
    fn empty_vocabulary_is_an_error() {
        let err = TfidfVectorizer::fit(VectorizerConfig::default(), &["the and", "of a"]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
        let docs = vec!["the and"; 10];
        let err = TfidfVectorizer::fit(VectorizerConfig::default(), &docs).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyVocabulary { min_df: 5, .. }));
    }
}
