// Azure OpenAI client implementation

use crate::streaming::parse_chat_sse_stream;
use crate::traits::{ChatClient, ChatOptions, ChatRequest, EmbeddingClient, EventStream};
use crate::types::{Content, Message};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;

/// Azure OpenAI client (HTTP direct, no SDK)
///
/// - URL: https://{resource}.openai.azure.com/openai/deployments/{deployment}/...
/// - Auth header: api-key instead of Authorization: Bearer
/// - Chat deployment name is passed via the model parameter in each request
/// - Embedding deployment name is fixed at build time
#[derive(Debug)]
pub struct AzureOpenAIClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_version: String,
    embedding_deployment: Option<String>,
}

impl AzureOpenAIClient {
    pub fn builder() -> AzureOpenAIClientBuilder {
        AzureOpenAIClientBuilder::default()
    }

    /// Build chat completion request payload
    pub(crate) fn build_chat_request(
        &self,
        model: &str,
        messages: Vec<Message>,
        options: &ChatOptions,
        stream: bool,
    ) -> Result<Value> {
        let azure_messages: Vec<Value> = messages
            .into_iter()
            .map(|msg| self.convert_message(msg))
            .collect::<Result<Vec<_>>>()?;

        let mut request = serde_json::Map::new();
        request.insert("messages".to_string(), Value::Array(azure_messages));
        request.insert("stream".to_string(), serde_json::json!(stream));

        // o1 and gpt-5 deployments reject sampling parameters
        let is_reasoning_model = model.starts_with("o1") || model.starts_with("gpt-5");

        if let Some(temp) = options.temperature {
            if !is_reasoning_model {
                request.insert("temperature".to_string(), serde_json::json!(temp));
            }
        }
        if let Some(top_p) = options.top_p {
            if !is_reasoning_model {
                request.insert("top_p".to_string(), serde_json::json!(top_p));
            }
        }
        if let Some(max_tokens) = options.max_tokens {
            let token_field = if is_reasoning_model {
                "max_completion_tokens"
            } else {
                "max_tokens"
            };
            request.insert(token_field.to_string(), serde_json::json!(max_tokens));
        }

        Ok(Value::Object(request))
    }

    /// Convert our Message type to Azure OpenAI format
    fn convert_message(&self, message: Message) -> Result<Value> {
        let role = message.role().to_string();
        let (content, name) = match message {
            Message::System { content, name }
            | Message::Human { content, name }
            | Message::AI { content, name } => (content, name),
        };

        let mut obj = serde_json::Map::new();
        obj.insert("role".to_string(), serde_json::json!(role));
        obj.insert("content".to_string(), self.convert_content(content)?);
        if let Some(name) = name {
            obj.insert("name".to_string(), serde_json::json!(name));
        }
        Ok(Value::Object(obj))
    }

    /// Convert Content to Azure OpenAI format (string or array)
    fn convert_content(&self, content: Content) -> Result<Value> {
        match content {
            Content::Text(s) => Ok(serde_json::json!(s)),
            Content::Parts(parts) => Ok(serde_json::to_value(parts)?),
        }
    }

    /// Build the full URL for an Azure OpenAI endpoint
    fn build_url(&self, deployment_name: &str, path: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.endpoint, deployment_name, path, self.api_version
        )
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure OpenAI API error ({}): {}", status, error_text);
        }

        Ok(response)
    }
}

/// Builder for AzureOpenAIClient
#[derive(Default)]
pub struct AzureOpenAIClientBuilder {
    api_key: Option<String>,
    endpoint: Option<String>,
    api_version: Option<String>,
    embedding_deployment: Option<String>,
}

impl AzureOpenAIClientBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the Azure OpenAI endpoint (base URL)
    /// Example: "https://my-resource.openai.azure.com"
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn embedding_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.embedding_deployment = Some(deployment.into());
        self
    }

    pub fn build(self) -> Result<AzureOpenAIClient> {
        let api_key = self.api_key.context("API key is required")?;
        let endpoint = self.endpoint.context("Endpoint is required")?;
        let api_version = self.api_version.context("API version is required")?;

        let endpoint = endpoint.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "api-key",
            HeaderValue::from_str(&api_key).context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(AzureOpenAIClient {
            http_client,
            endpoint,
            api_version,
            embedding_deployment: self.embedding_deployment,
        })
    }
}

#[async_trait]
impl ChatClient for AzureOpenAIClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<EventStream> {
        let url = self.build_url(&request.model, "chat/completions");
        let payload =
            self.build_chat_request(&request.model, request.messages, &request.options, true)?;

        tracing::debug!(deployment = %request.model, "Opening chat completion stream");
        let response = self.post(&url, &payload).await?;

        Ok(parse_chat_sse_stream(response))
    }
}

#[async_trait]
impl EmbeddingClient for AzureOpenAIClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let deployment = self
            .embedding_deployment
            .as_deref()
            .context("Embedding deployment is not configured")?;
        let url = self.build_url(deployment, "embeddings");
        let payload = serde_json::json!({ "input": text });

        let raw: AzureEmbeddingResponse = self
            .post(&url, &payload)
            .await?
            .json()
            .await
            .context("Failed to parse embedding response")?;

        raw.data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .context("Embedding response is missing data")
    }
}

// Azure-specific response types

#[derive(Debug, Clone, Deserialize)]
struct AzureEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
