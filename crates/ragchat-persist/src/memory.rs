use std::collections::HashMap;

use async_trait::async_trait;
use ragchat_types::{Assistant, ChatMessage, ChatThread};
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::store::{AssistantStore, MessageStore, ThreadStore};

/// Process-local store, used when no database is configured
#[derive(Debug, Default)]
pub struct InMemoryStore {
    threads: RwLock<HashMap<String, ChatThread>>,
    messages: RwLock<Vec<ChatMessage>>,
    assistants: RwLock<HashMap<String, Assistant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_thread(&self, thread: ChatThread) {
        self.threads.write().await.insert(thread.id.clone(), thread);
    }

    pub async fn insert_assistant(&self, assistant: Assistant) {
        self.assistants
            .write()
            .await
            .insert(assistant.id.clone(), assistant);
    }
}

#[async_trait]
impl ThreadStore for InMemoryStore {
    async fn get_by_id(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn update(&self, thread: &ChatThread) -> Result<()> {
        let mut threads = self.threads.write().await;
        match threads.get_mut(&thread.id) {
            Some(stored) => {
                *stored = thread.clone();
                Ok(())
            }
            None => Err(PersistError::ThreadNotFound(thread.id.clone())),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn get_all_by_thread_id(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.thread_id == thread_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal timestamps
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn add(&self, message: &ChatMessage) -> Result<()> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl AssistantStore for InMemoryStore {
    async fn get_by_id(&self, assistant_id: &str) -> Result<Option<Assistant>> {
        Ok(self.assistants.read().await.get(assistant_id).cloned())
    }
}
