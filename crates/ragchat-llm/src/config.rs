// Configuration layer for creating the chat and embedding clients from settings

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::azure_openai::AzureOpenAIClient;
use crate::traits::{ChatClient, EmbeddingClient};

/// Configuration for Azure OpenAI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    pub api_key: String,
    pub endpoint: String,
    pub api_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_deployment: Option<String>,
}

impl AzureConfig {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            api_version: api_version.into(),
            embedding_deployment: None,
        }
    }

    pub fn with_embedding_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.embedding_deployment = Some(deployment.into());
        self
    }
}

/// Factory for creating clients from configuration
pub struct ClientFactory;

impl ClientFactory {
    fn build(config: AzureConfig) -> Result<AzureOpenAIClient> {
        let mut builder = AzureOpenAIClient::builder()
            .api_key(config.api_key)
            .endpoint(config.endpoint)
            .api_version(config.api_version);
        if let Some(deployment) = config.embedding_deployment {
            builder = builder.embedding_deployment(deployment);
        }
        builder.build()
    }

    /// Create one Azure client serving both completion and embedding traffic
    pub fn create_clients(
        config: AzureConfig,
    ) -> Result<(Arc<dyn ChatClient>, Arc<dyn EmbeddingClient>)> {
        let client = Arc::new(Self::build(config)?);
        let chat: Arc<dyn ChatClient> = client.clone();
        let embeddings: Arc<dyn EmbeddingClient> = client;
        Ok((chat, embeddings))
    }

    pub fn create_chat_client(config: AzureConfig) -> Result<Arc<dyn ChatClient>> {
        Ok(Arc::new(Self::build(config)?))
    }

    pub fn create_embedding_client(config: AzureConfig) -> Result<Arc<dyn EmbeddingClient>> {
        Ok(Arc::new(Self::build(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_azure_config() {
        let config = AzureConfig::new(
            "test-key",
            "https://my-resource.openai.azure.com",
            "2024-06-01",
        )
        .with_embedding_deployment("text-embedding-3-small");

        assert_eq!(config.endpoint, "https://my-resource.openai.azure.com");
        assert_eq!(config.embedding_deployment.as_deref(), Some("text-embedding-3-small"));
    }

    #[test]
    fn test_create_clients() {
        let config = AzureConfig::new("test-key", "https://my-resource.openai.azure.com", "2024-06-01");
        assert!(ClientFactory::create_clients(config).is_ok());
    }

    #[test]
    fn test_serde_roundtrip_omits_missing_embedding() {
        let config = AzureConfig::new("k", "https://e", "v");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("embedding_deployment"));
        let back: AzureConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.api_version, "v");
    }
}
