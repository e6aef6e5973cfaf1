use config::{Config as ConfigLoader, ConfigError, Environment, File};
use ragchat_llm::config::AzureConfig;
use ragchat_orchestrator::{OrchestratorConfig, RetryPolicy, DEFAULT_GROUNDING_TEMPLATE};
use ragchat_search::{AzureSearchConfig, SearchFields};
use ragchat_types::GenerationDefaults;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub mongodb: MongoDbConfig,
    pub turn: TurnConfig,
    pub logging: LoggingConfig,

    // Secrets (from ENV only)
    #[serde(default)]
    pub azure_openai_api_key: String,
    #[serde(default)]
    pub azure_search_api_key: String,
    /// Unset means messages live in memory only
    #[serde(default)]
    pub mongodb_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_version: String,
    pub chat_deployment: String,
    pub embedding_deployment: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub past_messages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_version: String,
    #[serde(default)]
    pub semantic_configuration: Option<String>,
    #[serde(default)]
    pub fields: SearchFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoDbConfig {
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnConfig {
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub channel_capacity: usize,
    #[serde(default = "default_sink_write_timeout")]
    pub sink_write_timeout_ms: u64,
    /// Replaces the built-in grounding prompt
    #[serde(default)]
    pub grounding_template: Option<String>,
}

fn default_sink_write_timeout() -> u64 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Config {
    /// Load configuration from TOML files and environment variables
    ///
    /// Hierarchy (weakest to strongest):
    /// 1. config/default.toml
    /// 2. config/{ENV}.toml (if ENV is set)
    /// 3. `RAGCHAT_{SECTION}__{KEY}` environment variables, e.g. `RAGCHAT_LLM__CHAT_DEPLOYMENT`
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("ENV").unwrap_or_else(|_| "dev".to_string());

        let builder = ConfigLoader::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("RAGCHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg: Config = builder.build()?.try_deserialize()?;

        // Secrets never come from files
        cfg.azure_openai_api_key = std::env::var("AZURE_OPENAI_API_KEY").map_err(|_| {
            ConfigError::Message("AZURE_OPENAI_API_KEY environment variable is required".to_string())
        })?;
        cfg.azure_search_api_key = std::env::var("AZURE_SEARCH_API_KEY").map_err(|_| {
            ConfigError::Message("AZURE_SEARCH_API_KEY environment variable is required".to_string())
        })?;
        cfg.mongodb_uri = std::env::var("MONGODB_URI").ok().filter(|uri| !uri.is_empty());

        Ok(cfg)
    }

    /// Load config from a specific path (useful for testing)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        ConfigLoader::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    pub fn azure_openai(&self) -> AzureConfig {
        AzureConfig::new(
            self.azure_openai_api_key.clone(),
            self.llm.endpoint.clone(),
            self.llm.api_version.clone(),
        )
        .with_embedding_deployment(self.llm.embedding_deployment.clone())
    }

    pub fn azure_search(&self) -> AzureSearchConfig {
        AzureSearchConfig {
            endpoint: self.search.endpoint.clone(),
            api_key: self.azure_search_api_key.clone(),
            api_version: self.search.api_version.clone(),
            fields: self.search.fields.clone(),
            semantic_configuration: self.search.semantic_configuration.clone(),
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            deployment: self.llm.chat_deployment.clone(),
            defaults: GenerationDefaults {
                temperature: self.llm.temperature,
                top_p: self.llm.top_p,
                max_tokens: self.llm.max_tokens,
                past_messages: self.llm.past_messages,
            },
            retry: RetryPolicy::new(
                self.turn.retry_attempts,
                Duration::from_millis(self.turn.retry_delay_ms),
            ),
            grounding_template: self
                .turn
                .grounding_template
                .clone()
                .unwrap_or_else(|| DEFAULT_GROUNDING_TEMPLATE.to_string()),
            sink_write_timeout: Duration::from_millis(self.turn.sink_write_timeout_ms),
        }
    }
}
