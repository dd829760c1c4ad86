//! Search types, the search-index collaborator contract, and the caching dispatcher.

mod dispatcher;

use crate::qdrant::QdrantError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use dispatcher::{SearchCapabilities, SearchDispatcher, SearchSettings};

/// Retrieval strategy requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Full-text match against stored document text.
    Keyword,
    /// Similarity search over document vectors.
    Vector,
    /// Weighted fusion of keyword and vector results.
    Hybrid,
}

impl SearchMode {
    /// Lowercase identifier used in cache keys and on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SearchMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "vector" => Ok(Self::Vector),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(()),
        }
    }
}

/// Query parameters supplied to [`SearchDispatcher::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Natural language or keyword query text.
    pub text: String,
    /// Maximum number of hits to return.
    pub limit: usize,
    /// Minimum score a hit must reach.
    pub min_score: Option<f32>,
}

impl SearchQuery {
    /// Build a query with the default limit of 10 and no score floor.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 10,
            min_score: None,
        }
    }

    /// Override the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set a minimum score.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Query text trimmed, lowercased, and with whitespace runs collapsed.
    pub fn normalized_text(&self) -> String {
        self.text
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Canonical rendering of everything that affects the result set.
    ///
    /// Queries that differ only in case or whitespace share a normalized form.
    pub fn normalized_form(&self) -> String {
        let mut form = format!("{}?limit={}", self.normalized_text(), self.limit);
        if let Some(min_score) = self.min_score {
            form.push_str(&format!("&min_score={min_score}"));
        }
        form
    }
}

/// Single scored document returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Source document identifier.
    pub id: String,
    /// Relevance score; for hybrid results the weighted sum of the component scores.
    pub score: f32,
    /// Stored document text, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Origin of the document, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

/// Ordered result set for one search call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Mode that produced the hits.
    pub mode: SearchMode,
    /// Hits sorted by descending score.
    pub hits: Vec<SearchHit>,
}

impl SearchResults {
    /// Number of hits in the result set.
    pub fn total(&self) -> usize {
        self.hits.len()
    }
}

/// Document written to the search index by a sync run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// Stable identifier of the source item.
    pub id: String,
    /// Full document text.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
    /// Content fingerprint recorded with the document.
    pub fingerprint: String,
    /// Origin of the document, if known.
    pub source_uri: Option<String>,
}

/// Criteria passed to [`SearchIndex::query`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryCriteria {
    /// Full-text match on stored text.
    Keyword {
        /// Text to match.
        text: String,
        /// Maximum number of hits.
        limit: usize,
    },
    /// Similarity search around a query vector.
    Vector {
        /// Query embedding.
        vector: Vec<f32>,
        /// Maximum number of hits.
        limit: usize,
        /// Minimum similarity accepted by the index.
        min_score: Option<f32>,
    },
}

/// Errors surfaced by search index backends.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Qdrant rejected or failed a request.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Backend could not serve the request.
    #[error("Search index unavailable: {0}")]
    Unavailable(String),
}

/// Search index collaborator: written by sync runs, queried by the dispatcher.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Insert or replace the document stored under `document.id`.
    async fn upsert(&self, document: IndexedDocument) -> Result<(), IndexError>;

    /// Execute a query and return hits sorted by descending score.
    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<SearchHit>, IndexError>;
}
