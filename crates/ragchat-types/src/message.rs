use chrono::{DateTime, Utc};
use ragchat_llm::{HistoryEntry, HistoryRole};
use serde::{Deserialize, Serialize};

use crate::citation::Citation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<MessageRole> for HistoryRole {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::System => HistoryRole::System,
            MessageRole::User => HistoryRole::User,
            MessageRole::Assistant => HistoryRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reaction {
    Like,
    Dislike,
}

/// Typed metadata attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageOptions {
    Reaction {
        reaction: Reaction,
    },

    Citations {
        citations: Vec<Citation>,
    },

    /// What retrieval ran for this answer
    SearchProcess {
        index_name: String,
        query: String,
        strictness: u8,
        document_limit: u32,
        result_count: usize,
    },

    /// How generation ended; `truncated` marks a cancelled or failed stream
    Generation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
        #[serde(default)]
        truncated: bool,
    },

    Other {
        key: String,
        value: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub options: Vec<MessageOptions>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl ChatMessage {
    pub fn new(
        thread_id: impl Into<String>,
        user_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            options: Vec::new(),
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    pub fn user(thread_id: impl Into<String>, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, user_id, MessageRole::User, content)
    }

    pub fn assistant(thread_id: impl Into<String>, user_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(thread_id, user_id, MessageRole::Assistant, content)
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_option(mut self, option: MessageOptions) -> Self {
        self.options.push(option);
        self
    }

    /// Citations attached to this message, if any
    pub fn citations(&self) -> &[Citation] {
        self.options
            .iter()
            .find_map(|o| match o {
                MessageOptions::Citations { citations } => Some(citations.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

impl From<&ChatMessage> for HistoryEntry {
    fn from(message: &ChatMessage) -> Self {
        HistoryEntry::new(message.role.into(), message.content.clone())
    }
}
