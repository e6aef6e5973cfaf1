use async_trait::async_trait;
use ragchat_types::{Assistant, ChatMessage, ChatThread};

use crate::error::Result;

#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Returns soft-deleted threads as well; callers decide how to treat them
    async fn get_by_id(&self, thread_id: &str) -> Result<Option<ChatThread>>;

    /// Replace the stored thread document
    async fn update(&self, thread: &ChatThread) -> Result<()>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All messages of a thread ordered by creation time, soft-deleted ones included
    async fn get_all_by_thread_id(&self, thread_id: &str) -> Result<Vec<ChatMessage>>;

    async fn add(&self, message: &ChatMessage) -> Result<()>;
}

#[async_trait]
pub trait AssistantStore: Send + Sync {
    async fn get_by_id(&self, assistant_id: &str) -> Result<Option<Assistant>>;
}
