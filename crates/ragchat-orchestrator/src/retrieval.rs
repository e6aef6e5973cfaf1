use std::sync::Arc;

use anyhow::{Context, Result};
use ragchat_llm::EmbeddingClient;
use ragchat_search::{RetrievalClient, RetrievalQuery};
use ragchat_types::{Assistant, ChatThread, Citation};

/// Index and relevance settings of a grounded turn
#[derive(Debug, Clone, PartialEq)]
pub struct GroundingTarget {
    pub index_name: String,
    pub strictness: u8,
    pub document_limit: u32,
}

impl GroundingTarget {
    /// Grounded only when an assistant with an index is attached; a thread-level index overrides it
    pub fn decide(thread: &ChatThread, assistant: Option<&Assistant>) -> Option<Self> {
        let assistant_index = assistant?.grounding_index()?;
        let index_name = thread
            .filter_options
            .index_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(assistant_index);

        Some(Self {
            index_name: index_name.to_string(),
            strictness: thread.filter_options.strictness,
            document_limit: thread.filter_options.document_limit,
        })
    }
}

/// Embeds the prompt and queries the index for supporting chunks
#[derive(Clone)]
pub struct Retriever {
    embeddings: Arc<dyn EmbeddingClient>,
    search: Arc<dyn RetrievalClient>,
}

impl Retriever {
    pub fn new(embeddings: Arc<dyn EmbeddingClient>, search: Arc<dyn RetrievalClient>) -> Self {
        Self { embeddings, search }
    }

    /// Citations in backend relevance order; an empty result is not an error
    pub async fn retrieve_grounding_documents(
        &self,
        prompt: &str,
        target: &GroundingTarget,
    ) -> Result<Vec<Citation>> {
        anyhow::ensure!(!target.index_name.is_empty(), "Index name is required");

        let vector = self
            .embeddings
            .embed(prompt)
            .await
            .context("Failed to embed prompt")?;

        let query = RetrievalQuery::new(&target.index_name, prompt, vector)
            .document_limit(target.document_limit)
            .strictness(target.strictness);

        let hits = self
            .search
            .search(&query)
            .await
            .with_context(|| format!("Search on index '{}' failed", target.index_name))?;

        Ok(hits.into_iter().map(Citation::from).collect())
    }
}
