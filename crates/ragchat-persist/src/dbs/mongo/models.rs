use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use ragchat_types::{
    AgentThreadConfig, Assistant, ChatMessage, ChatThread, FilterOptions, MessageOptions,
    MessageRole, PromptOptions,
};
use serde::{Deserialize, Serialize};

/// Thread document; ids are the application's string ids, dates are BSON dates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoThread {
    #[serde(rename = "_id")]
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
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_modified_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub options: Vec<MessageOptions>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Assistant document, read-only to this service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAssistant {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub strictness: Option<u8>,
    #[serde(default)]
    pub document_limit: Option<u32>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl From<&ChatThread> for MongoThread {
    fn from(t: &ChatThread) -> Self {
        Self {
            id: t.id.clone(),
            user_id: t.user_id.clone(),
            name: t.name.clone(),
            bookmarked: t.bookmarked,
            assistant_id: t.assistant_id.clone(),
            prompt_options: t.prompt_options.clone(),
            filter_options: t.filter_options.clone(),
            agent_thread: t.agent_thread.clone(),
            created_at: t.created_at,
            last_modified_at: t.last_modified_at,
            is_deleted: t.is_deleted,
        }
    }
}

impl From<MongoThread> for ChatThread {
    fn from(t: MongoThread) -> Self {
        Self {
            id: t.id,
            user_id: t.user_id,
            name: t.name,
            bookmarked: t.bookmarked,
            assistant_id: t.assistant_id,
            prompt_options: t.prompt_options,
            filter_options: t.filter_options,
            agent_thread: t.agent_thread,
            created_at: t.created_at,
            last_modified_at: t.last_modified_at,
            is_deleted: t.is_deleted,
        }
    }
}

impl From<&ChatMessage> for MongoMessage {
    fn from(m: &ChatMessage) -> Self {
        Self {
            id: m.id.clone(),
            thread_id: m.thread_id.clone(),
            user_id: m.user_id.clone(),
            role: m.role,
            content: m.content.clone(),
            options: m.options.clone(),
            created_at: m.created_at,
            is_deleted: m.is_deleted,
        }
    }
}

impl From<MongoMessage> for ChatMessage {
    fn from(m: MongoMessage) -> Self {
        Self {
            id: m.id,
            thread_id: m.thread_id,
            user_id: m.user_id,
            role: m.role,
            content: m.content,
            options: m.options,
            created_at: m.created_at,
            is_deleted: m.is_deleted,
        }
    }
}

impl From<MongoAssistant> for Assistant {
    fn from(a: MongoAssistant) -> Self {
        Self {
            id: a.id,
            name: a.name,
            system_message: a.system_message,
            greeting: a.greeting,
            index_name: a.index_name,
            temperature: a.temperature,
            top_p: a.top_p,
            max_tokens: a.max_tokens,
            strictness: a.strictness,
            document_limit: a.document_limit,
            tools: a.tools,
        }
    }
}
