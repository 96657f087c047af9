//! TF-IDF text index.
//!
//! Tokenizes source text and maintains global document count plus
//! per-term document frequency; each document's term-frequency vector is
//! kept incrementally at insertion. Search weights both sides with
//! inverse document frequency computed from the live corpus statistics
//! and scores by cosine similarity over the TF-IDF weight vectors.
//! Query terms absent from the corpus match no documents and are
//! skipped.

mod tokenizer;

pub use tokenizer::{tokenize, Tokens};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::index::SearchHit;
use crate::types::VectorId;

/// Configuration for a TF-IDF index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TfIdfIndexConfig {
    /// Keep the raw source text on the committed vector record. When
    /// false the text is indexed and then dropped from the record.
    pub store_raw_text: bool,
}

impl Default for TfIdfIndexConfig {
    fn default() -> Self {
        Self {
            store_raw_text: true,
        }
    }
}

/// One posting: document id and term frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DocPosting {
    id: VectorId,
    tf: u32,
}

/// The TF-IDF index.
#[derive(Debug)]
pub struct TfIdfIndex {
    config: TfIdfIndexConfig,
    /// Term string → interned term id.
    terms: HashMap<String, u32>,
    /// Interned term id → postings. Document frequency is the posting
    /// list length.
    postings: HashMap<u32, Vec<DocPosting>>,
    /// Document id → (term id, term frequency) pairs.
    docs: HashMap<VectorId, Vec<(u32, u32)>>,
}

impl TfIdfIndex {
    /// Creates an empty index.
    pub fn new(config: TfIdfIndexConfig) -> Self {
        Self {
            config,
            terms: HashMap::new(),
            postings: HashMap::new(),
            docs: HashMap::new(),
        }
    }

    /// Returns the index configuration.
    pub fn config(&self) -> &TfIdfIndexConfig {
        &self.config
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Returns true if no documents are indexed.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Returns true if `id` is indexed.
    pub fn contains(&self, id: VectorId) -> bool {
        self.docs.contains_key(&id)
    }

    /// Indexes a document's text. The caller guarantees id uniqueness.
    pub fn insert(&mut self, id: VectorId, text: &str) {
        debug_assert!(
            !self.docs.contains_key(&id),
            "duplicate id reached the TF-IDF index"
        );
        let tokens = tokenize(text);
        let mut frequencies: HashMap<&str, u32> = HashMap::new();
        for token in tokens.iter() {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        let mut doc_terms = Vec::with_capacity(frequencies.len());
        for (token, tf) in frequencies {
            let next_id = self.terms.len() as u32;
            let term_id = *self.terms.entry(token.to_string()).or_insert(next_id);
            self.postings
                .entry(term_id)
                .or_default()
                .push(DocPosting { id, tf });
            doc_terms.push((term_id, tf));
        }
        self.docs.insert(id, doc_terms);
    }

    /// Removes a document. Returns false if the id is unknown.
    pub fn delete(&mut self, id: VectorId) -> bool {
        let Some(doc_terms) = self.docs.remove(&id) else {
            return false;
        };
        for (term_id, _) in doc_terms {
            if let Some(list) = self.postings.get_mut(&term_id) {
                list.retain(|p| p.id != id);
                if list.is_empty() {
                    self.postings.remove(&term_id);
                }
            }
        }
        true
    }

    /// Inverse document frequency from the current corpus statistics.
    #[inline]
    fn idf(&self, document_frequency: usize) -> f32 {
        (1.0 + self.docs.len() as f32 / document_frequency as f32).ln()
    }

    /// Top-k search by cosine similarity over TF-IDF weight vectors,
    /// ties broken by lower id.
    pub fn search(&self, query_text: &str, top_k: usize) -> Vec<SearchHit> {
        if top_k == 0 || self.docs.is_empty() {
            return Vec::new();
        }
        let tokens = tokenize(query_text);
        let mut query_tf: HashMap<&str, u32> = HashMap::new();
        for token in tokens.iter() {
            *query_tf.entry(token).or_insert(0) += 1;
        }

        // Query-side weights, restricted to terms the corpus knows.
        let mut query_weights: Vec<(u32, f32, f32)> = Vec::new(); // (term, qw, idf)
        let mut query_norm_sq = 0.0f32;
        for (token, tf) in query_tf {
            let Some(&term_id) = self.terms.get(token) else {
                continue;
            };
            let Some(list) = self.postings.get(&term_id) else {
                continue;
            };
            let idf = self.idf(list.len());
            let qw = tf as f32 * idf;
            query_norm_sq += qw * qw;
            query_weights.push((term_id, qw, idf));
        }
        if query_weights.is_empty() {
            return Vec::new();
        }
        let query_norm = query_norm_sq.sqrt();

        // Weighted term overlap via the posting lists.
        let mut numerators: HashMap<VectorId, f32> = HashMap::new();
        for &(term_id, qw, idf) in &query_weights {
            for posting in &self.postings[&term_id] {
                *numerators.entry(posting.id).or_insert(0.0) += posting.tf as f32 * idf * qw;
            }
        }

        let mut hits: Vec<SearchHit> = numerators
            .into_iter()
            .map(|(id, numerator)| {
                let norm = self.document_norm(id);
                let score = if norm > 0.0 {
                    numerator / (norm * query_norm)
                } else {
                    0.0
                };
                SearchHit { id, score }
            })
            .collect();
        hits.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        hits
    }

    /// Norm of one document's TF-IDF weight vector under current corpus
    /// statistics.
    fn document_norm(&self, id: VectorId) -> f32 {
        let Some(doc_terms) = self.docs.get(&id) else {
            return 0.0;
        };
        let mut sum = 0.0f32;
        for &(term_id, tf) in doc_terms {
            if let Some(list) = self.postings.get(&term_id) {
                let w = tf as f32 * self.idf(list.len());
                sum += w * w;
            }
        }
        sum.sqrt()
    }
}
