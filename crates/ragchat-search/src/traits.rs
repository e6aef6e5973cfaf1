use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Strictness bounds; values outside are clamped
pub const MIN_STRICTNESS: u8 = 1;
pub const MAX_STRICTNESS: u8 = 5;

/// A single retrieval request against one index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub index_name: String,
    pub query: String,
    pub vector: Vec<f32>,
    pub document_limit: u32,
    /// Relevance threshold, 1 (recall) to 5 (precision)
    pub strictness: u8,
}

impl RetrievalQuery {
    pub fn new(index_name: impl Into<String>, query: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            index_name: index_name.into(),
            query: query.into(),
            vector,
            document_limit: 5,
            strictness: 3,
        }
    }

    pub fn document_limit(mut self, limit: u32) -> Self {
        self.document_limit = limit;
        self
    }

    pub fn strictness(mut self, strictness: u8) -> Self {
        self.strictness = strictness.clamp(MIN_STRICTNESS, MAX_STRICTNESS);
        self
    }
}

/// A ranked chunk returned by the search backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    pub url: String,
    pub name: String,
    pub score: Option<f64>,
    pub reranker_score: Option<f64>,
}

/// Retrieval backend, returning hits in relevance order
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<SearchHit>>;
}
