// Azure AI Search client (REST, hybrid text + vector query)

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::traits::{RetrievalClient, RetrievalQuery, SearchHit};

/// Semantic reranker scores range from 0 to 4; each strictness step raises the floor by this much
const RERANKER_SCORE_PER_STRICTNESS: f64 = 0.6;

/// Index field names holding chunk text, display name, source locator and embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFields {
    pub content: String,
    pub title: String,
    pub url: String,
    pub vector: String,
}

impl Default for SearchFields {
    fn default() -> Self {
        // Field names produced by Azure AI Search integrated vectorization
        Self {
            content: "chunk".to_string(),
            title: "title".to_string(),
            url: "url".to_string(),
            vector: "text_vector".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureSearchConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    #[serde(default)]
    pub fields: SearchFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_configuration: Option<String>,
}

#[derive(Debug)]
pub struct AzureSearchClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_version: String,
    fields: SearchFields,
    semantic_configuration: Option<String>,
}

impl AzureSearchClient {
    pub fn builder() -> AzureSearchClientBuilder {
        AzureSearchClientBuilder::default()
    }

    pub fn from_config(config: AzureSearchConfig) -> Result<Self> {
        let mut builder = Self::builder()
            .endpoint(config.endpoint)
            .api_key(config.api_key)
            .api_version(config.api_version)
            .fields(config.fields);
        if let Some(semantic) = config.semantic_configuration {
            builder = builder.semantic_configuration(semantic);
        }
        builder.build()
    }

    /// Index names are percent-encoded as a single path segment
    fn build_url(&self, index_name: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).context("Invalid search endpoint")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Search endpoint cannot carry a path: {}", self.endpoint))?
            .pop_if_empty()
            .extend(["indexes", index_name, "docs", "search"]);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    pub(crate) fn build_search_request(&self, query: &RetrievalQuery) -> Value {
        let mut body = Map::new();
        body.insert("search".to_string(), Value::String(query.query.clone()));
        body.insert("top".to_string(), serde_json::json!(query.document_limit));
        body.insert(
            "select".to_string(),
            Value::String(format!(
                "{},{},{}",
                self.fields.content, self.fields.title, self.fields.url
            )),
        );

        if !query.vector.is_empty() {
            body.insert(
                "vectorQueries".to_string(),
                serde_json::json!([{
                    "kind": "vector",
                    "vector": query.vector,
                    "fields": self.fields.vector,
                    "k": query.document_limit,
                }]),
            );
        }

        if let Some(semantic) = &self.semantic_configuration {
            body.insert("queryType".to_string(), Value::String("semantic".to_string()));
            body.insert(
                "semanticConfiguration".to_string(),
                Value::String(semantic.clone()),
            );
        }

        Value::Object(body)
    }

    /// Map a raw document to a hit, dropping ones below the strictness floor
    fn to_hit(&self, doc: &Map<String, Value>, strictness: u8) -> Option<SearchHit> {
        let text = |field: &str| {
            doc.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let reranker_score = doc.get("@search.rerankerScore").and_then(Value::as_f64);
        if let Some(score) = reranker_score {
            if score < f64::from(strictness) * RERANKER_SCORE_PER_STRICTNESS {
                return None;
            }
        }

        Some(SearchHit {
            content: text(&self.fields.content),
            url: text(&self.fields.url),
            name: text(&self.fields.title),
            score: doc.get("@search.score").and_then(Value::as_f64),
            reranker_score,
        })
    }
}

#[derive(Default)]
pub struct AzureSearchClientBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    api_version: Option<String>,
    fields: SearchFields,
    semantic_configuration: Option<String>,
}

impl AzureSearchClientBuilder {
    /// Example: "https://my-search.search.windows.net"
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn fields(mut self, fields: SearchFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn semantic_configuration(mut self, name: impl Into<String>) -> Self {
        self.semantic_configuration = Some(name.into());
        self
    }

    pub fn build(self) -> Result<AzureSearchClient> {
        let endpoint = self.endpoint.context("Endpoint is required")?;
        let api_key = self.api_key.context("API key is required")?;
        let api_version = self.api_version.context("API version is required")?;

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

        Ok(AzureSearchClient {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version,
            fields: self.fields,
            semantic_configuration: self.semantic_configuration,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

#[async_trait]
impl RetrievalClient for AzureSearchClient {
    async fn search(&self, query: &RetrievalQuery) -> Result<Vec<SearchHit>> {
        let url = self.build_url(&query.index_name)?;
        let payload = self.build_search_request(query);

        let response = self
            .http_client
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Azure AI Search error ({}): {}", status, error_text);
        }

        let raw: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;
        let returned = raw.value.len();

        let hits: Vec<SearchHit> = raw
            .value
            .iter()
            .filter_map(|doc| self.to_hit(doc, query.strictness))
            .collect();

        tracing::debug!(
            index = %query.index_name,
            returned,
            kept = hits.len(),
            strictness = query.strictness,
            "Search completed"
        );

        Ok(hits)
    }
}
