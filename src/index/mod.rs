//! Index implementations attached to collections.
//!
//! A collection holds at most one index of each kind: a graph-based
//! dense index, an inverted sparse index, and a TF-IDF text index. All
//! three expose insert/delete/search over committed vector state; the
//! transaction coordinator applies committed mutations to every attached
//! index in one step.

pub mod dense;
pub mod sparse;
pub mod tfidf;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::VectorId;

/// One search result: vector id and similarity score, higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching vector id.
    pub id: VectorId,
    /// Similarity score under the index's metric.
    pub score: f32,
}

/// The kinds of index a collection can have attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// Graph-based dense index.
    Dense,
    /// Inverted sparse index.
    Sparse,
    /// TF-IDF text index.
    TfIdf,
}

impl IndexKind {
    /// Returns the lowercase kind name used in errors and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
            Self::TfIdf => "tf-idf",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
