use std::sync::Arc;

use anyhow::{anyhow, Result};
use ragchat_llm::{ChatClient, EmbeddingClient};
use ragchat_persist::{AssistantStore, MessageStore, ThreadStore};
use ragchat_search::RetrievalClient;

use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::retrieval::Retriever;

/// Builder for wiring an Orchestrator to its collaborators
pub struct OrchestratorBuilder {
    threads: Option<Arc<dyn ThreadStore>>,
    messages: Option<Arc<dyn MessageStore>>,
    assistants: Option<Arc<dyn AssistantStore>>,
    chat: Option<Arc<dyn ChatClient>>,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
    search: Option<Arc<dyn RetrievalClient>>,
    config: Option<OrchestratorConfig>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            threads: None,
            messages: None,
            assistants: None,
            chat: None,
            embeddings: None,
            search: None,
            config: None,
        }
    }

    pub fn thread_store(mut self, store: Arc<dyn ThreadStore>) -> Self {
        self.threads = Some(store);
        self
    }

    pub fn message_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.messages = Some(store);
        self
    }

    pub fn assistant_store(mut self, store: Arc<dyn AssistantStore>) -> Self {
        self.assistants = Some(store);
        self
    }

    pub fn chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(client);
        self
    }

    pub fn embedding_client(mut self, client: Arc<dyn EmbeddingClient>) -> Self {
        self.embeddings = Some(client);
        self
    }

    pub fn retrieval_client(mut self, client: Arc<dyn RetrievalClient>) -> Self {
        self.search = Some(client);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let threads = self.threads.ok_or_else(|| anyhow!("Thread store is required"))?;
        let messages = self.messages.ok_or_else(|| anyhow!("Message store is required"))?;
        let assistants = self
            .assistants
            .ok_or_else(|| anyhow!("Assistant store is required"))?;
        let chat = self.chat.ok_or_else(|| anyhow!("Chat client is required"))?;
        let embeddings = self
            .embeddings
            .ok_or_else(|| anyhow!("Embedding client is required"))?;
        let search = self.search.ok_or_else(|| anyhow!("Retrieval client is required"))?;
        let config = self.config.ok_or_else(|| anyhow!("Orchestrator config is required"))?;

        Ok(Orchestrator::new(
            threads,
            messages,
            assistants,
            chat,
            Retriever::new(embeddings, search),
            config,
        ))
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
