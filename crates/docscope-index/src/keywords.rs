//! Keyword extraction into a sparse TF-IDF term-document matrix.
//!
//! Documents are tokenized on Unicode word boundaries, filtered, stemmed and
//! weighted per (term, document):
//! - tf = count of term in document / tokens in document
//! - idf = ln((N + 1) / (df + 1)) + 1

use std::collections::HashMap;

use docscope_types::KeywordSettings;
use rayon::prelude::*;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Sparse `terms x documents` weight matrix stored by document column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseTermMatrix {
    n_terms: usize,
    /// One column per document: `(term id, weight)` sorted by term id
    columns: Vec<Vec<(usize, f32)>>,
}

impl SparseTermMatrix {
    /// Build from per-document columns. Entries must reference terms below `n_terms`.
    pub fn new(n_terms: usize, mut columns: Vec<Vec<(usize, f32)>>) -> Self {
        for column in columns.iter_mut() {
            column.retain(|(term, _)| *term < n_terms);
            column.sort_by_key(|(term, _)| *term);
        }
        Self { n_terms, columns }
    }

    /// Empty matrix spanning `n_documents` columns.
    pub fn empty(n_documents: usize) -> Self {
        Self {
            n_terms: 0,
            columns: vec![Vec::new(); n_documents],
        }
    }

    /// Number of vocabulary rows.
    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    /// Number of document columns.
    pub fn n_documents(&self) -> usize {
        self.columns.len()
    }

    /// True when there are no terms or no stored weights.
    pub fn is_empty(&self) -> bool {
        self.n_terms == 0 || self.columns.iter().all(|c| c.is_empty())
    }

    /// Stored entries of one document column (0-based).
    pub fn column(&self, document: usize) -> &[(usize, f32)] {
        self.columns.get(document).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Weight at (term, document), 0 if absent.
    pub fn get(&self, term: usize, document: usize) -> f32 {
        let column = self.column(document);
        column
            .binary_search_by_key(&term, |(t, _)| *t)
            .map(|pos| column[pos].1)
            .unwrap_or(0.0)
    }

    /// Dense per-term sum over the given document columns (0-based).
    pub fn sum_columns(&self, documents: &[usize]) -> Vec<f32> {
        let mut totals = vec![0.0f32; self.n_terms];
        for &doc in documents {
            for &(term, weight) in self.column(doc) {
                totals[term] += weight;
            }
        }
        totals
    }

    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }
}

/// Extracted keyword weights with the parallel vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordTable {
    /// `vocabulary.len() x documents` weights
    pub weights: SparseTermMatrix,
    /// Display form of each term, in first-seen order
    pub vocabulary: Vec<String>,
}

/// Tokenizes, stems and filters documents into a [`KeywordTable`].
pub struct KeywordExtractor {
    settings: KeywordSettings,
    stemmer: Option<Stemmer>,
}

#[derive(Default)]
struct TermStats {
    doc_frequency: usize,
    /// Surface forms in first-seen order with occurrence counts
    surfaces: Vec<(String, usize)>,
}

impl KeywordExtractor {
    /// Create an extractor.
    pub fn new(settings: KeywordSettings) -> Self {
        let stemmer = settings.stem.then(|| Stemmer::create(Algorithm::English));
        Self { settings, stemmer }
    }

    /// Tokenize one document into `(term key, surface form)` pairs.
    fn tokenize(&self, text: &str) -> Vec<(String, String)> {
        text.unicode_words()
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() > 1)
            .filter(|w| !is_stop_word(w))
            .filter(|w| !w.chars().all(|c| c.is_numeric()))
            .map(|w| {
                let key = match &self.stemmer {
                    Some(stemmer) => stemmer.stem(&w).into_owned(),
                    None => w.clone(),
                };
                (key, w)
            })
            .collect()
    }

    /// Build the keyword table for a corpus.
    ///
    /// Tokenization runs in parallel; vocabulary ids are assigned
    /// sequentially in first-seen order so the result is deterministic.
    pub fn extract(&self, documents: &[String]) -> KeywordTable {
        let n_docs = documents.len();
        let tokenized: Vec<Vec<(String, String)>> =
            documents.par_iter().map(|d| self.tokenize(d)).collect();

        let mut ids: HashMap<String, usize> = HashMap::new();
        let mut stats: Vec<TermStats> = Vec::new();
        let mut counts: Vec<Vec<(usize, usize)>> = Vec::with_capacity(n_docs);
        let mut lengths: Vec<usize> = Vec::with_capacity(n_docs);

        for tokens in &tokenized {
            let mut doc_counts: HashMap<usize, usize> = HashMap::new();
            for (key, surface) in tokens {
                let id = *ids.entry(key.clone()).or_insert_with(|| {
                    stats.push(TermStats::default());
                    stats.len() - 1
                });
                let entry = &mut stats[id];
                match entry.surfaces.iter_mut().find(|(s, _)| s == surface) {
                    Some((_, count)) => *count += 1,
                    None => entry.surfaces.push((surface.clone(), 1)),
                }
                *doc_counts.entry(id).or_insert(0) += 1;
            }
            for id in doc_counts.keys() {
                stats[*id].doc_frequency += 1;
            }
            let mut doc_counts: Vec<(usize, usize)> = doc_counts.into_iter().collect();
            doc_counts.sort_unstable();
            counts.push(doc_counts);
            lengths.push(tokens.len());
        }

        let max_df = (self.settings.max_document_ratio as f64 * n_docs as f64).floor() as usize;
        let mut remap: Vec<Option<usize>> = vec![None; stats.len()];
        let mut vocabulary = Vec::new();
        let mut kept_df = Vec::new();
        for (id, term) in stats.iter().enumerate() {
            if term.doc_frequency >= self.settings.min_document_frequency
                && term.doc_frequency <= max_df.max(1)
            {
                remap[id] = Some(vocabulary.len());
                vocabulary.push(display_form(&term.surfaces));
                kept_df.push(term.doc_frequency);
            }
        }

        let n = n_docs as f32;
        let columns: Vec<Vec<(usize, f32)>> = counts
            .iter()
            .zip(&lengths)
            .map(|(doc_counts, &len)| {
                doc_counts
                    .iter()
                    .filter_map(|&(id, count)| {
                        let term = remap[id]?;
                        let tf = count as f32 / len.max(1) as f32;
                        let idf = ((n + 1.0) / (kept_df[term] as f32 + 1.0)).ln() + 1.0;
                        Some((term, tf * idf))
                    })
                    .collect()
            })
            .collect();

        debug!(
            documents = n_docs,
            terms = vocabulary.len(),
            dropped = stats.len() - vocabulary.len(),
            "Extracted keywords"
        );

        KeywordTable {
            weights: SparseTermMatrix::new(vocabulary.len(), columns),
            vocabulary,
        }
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new(KeywordSettings::default())
    }
}

/// Most frequent surface form; earliest seen wins ties.
fn display_form(surfaces: &[(String, usize)]) -> String {
    let mut best: Option<&(String, usize)> = None;
    for candidate in surfaces {
        if best.map_or(true, |b| candidate.1 > b.1) {
            best = Some(candidate);
        }
    }
    best.map(|(s, _)| s.clone()).unwrap_or_default()
}

/// Check if a word is a stop word.
fn is_stop_word(word: &str) -> bool {
    const STOP_WORDS: &[&str] = &[
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "this",
        "they", "but", "have", "had", "what", "when", "where", "who", "which", "why", "how", "all",
        "each", "every", "both", "few", "more", "most", "other", "some", "such", "no", "nor",
        "not", "only", "own", "same", "so", "than", "too", "very", "can", "just", "should", "now",
        "also", "been", "being", "do", "does", "did", "doing", "would", "could", "might", "must",
        "shall", "about", "above", "after", "again", "against", "am", "any", "before", "below",
        "between", "into", "through", "during", "out", "over", "under", "up", "down", "then",
        "once", "here", "there", "if", "else", "while", "because", "until", "we", "you", "your",
        "our", "their", "him", "her", "them", "me", "my", "myself", "itself", "those", "these",
        "his", "she", "i", "us", "it's", "i'm", "don't",
    ];

    STOP_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn unstemmed() -> KeywordExtractor {
        KeywordExtractor::new(KeywordSettings {
            stem: false,
            ..Default::default()
        })
    }

    #[test]
    fn test_tokenize_filters() {
        let extractor = unstemmed();
        let tokens: Vec<String> = extractor
            .tokenize("The quick brown fox, a 123 x rust!")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(tokens, vec!["quick", "brown", "fox", "rust"]);
    }

    #[test]
    fn test_stemming_merges_inflections() {
        let extractor = KeywordExtractor::default();
        let table = extractor.extract(&docs(&["running runs", "running fast"]));
        // "running" and "runs" share the stem "run"; the display form is the
        // most frequent surface
        assert_eq!(table.vocabulary[0], "running");
        assert_eq!(table.vocabulary.len(), 2);
    }

    #[test]
    fn test_vocabulary_first_seen_order() {
        let table = unstemmed().extract(&docs(&["zebra apple", "mango zebra"]));
        assert_eq!(table.vocabulary, vec!["zebra", "apple", "mango"]);
        assert_eq!(table.weights.n_terms(), 3);
        assert_eq!(table.weights.n_documents(), 2);
    }

    #[test]
    fn test_tfidf_weights() {
        let table = unstemmed().extract(&docs(&["rust rust python", "python"]));
        // rust: tf = 2/3, df = 1, idf = ln(3/2) + 1
        let rust = table.weights.get(0, 0);
        let expected = (2.0 / 3.0) * ((3.0f32 / 2.0).ln() + 1.0);
        assert!((rust - expected).abs() < 1e-5);
        assert_eq!(table.weights.get(0, 1), 0.0);
        // python: in both documents, idf = ln(3/3) + 1 = 1
        assert!((table.weights.get(1, 1) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_document_frequency_filters() {
        let extractor = KeywordExtractor::new(KeywordSettings {
            stem: false,
            min_document_frequency: 2,
            ..Default::default()
        });
        let table = extractor.extract(&docs(&["shared rare", "shared other"]));
        assert_eq!(table.vocabulary, vec!["shared"]);

        let extractor = KeywordExtractor::new(KeywordSettings {
            stem: false,
            max_document_ratio: 0.5,
            ..Default::default()
        });
        let table = extractor.extract(&docs(&["shared rare", "shared other"]));
        assert_eq!(table.vocabulary, vec!["rare", "other"]);
    }

    #[test]
    fn test_sum_columns() {
        let table = unstemmed().extract(&docs(&["alpha beta", "alpha", "gamma"]));
        let totals = table.weights.sum_columns(&[0, 1]);
        assert_eq!(totals.len(), 3);
        assert!(totals[0] > totals[1]);
        assert_eq!(totals[2], 0.0);
    }

    #[test]
    fn test_empty_corpus_and_empty_documents() {
        let table = KeywordExtractor::default().extract(&[]);
        assert!(table.vocabulary.is_empty());
        assert!(table.weights.is_empty());

        let table = KeywordExtractor::default().extract(&docs(&["", "the and"]));
        assert!(table.weights.is_empty());
        assert_eq!(table.weights.n_documents(), 2);
    }

    #[test]
    fn test_is_stop_word() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("and"));
        assert!(!is_stop_word("rust"));
    }
}
