use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name a thread carries until its first prompt titles it
pub const DEFAULT_THREAD_NAME: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatThread {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub bookmarked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub prompt_options: PromptOptions,
    #[serde(default)]
    pub filter_options: FilterOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_thread: Option<AgentThreadConfig>,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ChatThread {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: DEFAULT_THREAD_NAME.to_string(),
            bookmarked: false,
            assistant_id: None,
            prompt_options: PromptOptions::default(),
            filter_options: FilterOptions::default(),
            agent_thread: None,
            created_at: now,
            last_modified_at: now,
            is_deleted: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_assistant(mut self, assistant_id: impl Into<String>) -> Self {
        self.assistant_id = Some(assistant_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// True while the thread still carries the placeholder name
    pub fn has_default_name(&self) -> bool {
        self.name == DEFAULT_THREAD_NAME
    }

    /// Owner check; identities compare case-insensitively
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.to_lowercase() == user_id.to_lowercase()
    }
}

/// Per-thread generation overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Number of prior user/assistant messages fed to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past_messages: Option<u32>,
}

/// Per-thread retrieval settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Overrides the assistant's index when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default = "default_strictness")]
    pub strictness: u8,
    #[serde(default = "default_document_limit")]
    pub document_limit: u32,
}

fn default_strictness() -> u8 {
    3
}

fn default_document_limit() -> u32 {
    5
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            index_name: None,
            strictness: default_strictness(),
            document_limit: default_document_limit(),
        }
    }
}

/// Binding to a thread kept by an external agent service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentThreadConfig {
    pub external_thread_id: String,
}
