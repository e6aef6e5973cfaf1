use async_trait::async_trait;
use bson::doc;
use futures::TryStreamExt;
use mongodb::{Client, Collection};
use ragchat_types::{Assistant, ChatMessage, ChatThread};

use crate::dbs::mongo::models::{MongoAssistant, MongoMessage, MongoThread};
use crate::error::{PersistError, Result};
use crate::store::{AssistantStore, MessageStore, ThreadStore};

/// Store backed by MongoDB or Azure Cosmos DB for MongoDB
#[derive(Clone)]
pub struct MongoStore {
    threads: Collection<MongoThread>,
    messages: Collection<MongoMessage>,
    assistants: Collection<MongoAssistant>,
}

impl MongoStore {
    /// Connect to MongoDB and bind the `threads`, `messages` and `assistants` collections
    pub async fn connect(mongodb_uri: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(mongodb_uri)
            .await
            .map_err(|e| PersistError::Connection(e.to_string()))?;

        tracing::info!(database = %database, "MongoDB client ready");
        Ok(Self::from_client(&client, database))
    }

    pub fn from_client(client: &Client, database: &str) -> Self {
        let db = client.database(database);
        Self {
            threads: db.collection("threads"),
            messages: db.collection("messages"),
            assistants: db.collection("assistants"),
        }
    }
}

#[async_trait]
impl ThreadStore for MongoStore {
    async fn get_by_id(&self, thread_id: &str) -> Result<Option<ChatThread>> {
        let thread = self.threads.find_one(doc! { "_id": thread_id }).await?;
        Ok(thread.map(Into::into))
    }

    async fn update(&self, thread: &ChatThread) -> Result<()> {
        let replacement = MongoThread::from(thread);
        let result = self
            .threads
            .replace_one(doc! { "_id": thread.id.as_str() }, &replacement)
            .await?;

        if result.matched_count == 0 {
            tracing::warn!(thread_id = %thread.id, "Thread update matched no document");
            return Err(PersistError::ThreadNotFound(thread.id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MongoStore {
    async fn get_all_by_thread_id(&self, thread_id: &str) -> Result<Vec<ChatMessage>> {
        let messages: Vec<MongoMessage> = self
            .messages
            .find(doc! { "thread_id": thread_id })
            .sort(doc! { "created_at": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn add(&self, message: &ChatMessage) -> Result<()> {
        self.messages.insert_one(MongoMessage::from(message)).await?;
        tracing::debug!(
            thread_id = %message.thread_id,
            message_id = %message.id,
            role = ?message.role,
            "Message stored"
        );
        Ok(())
    }
}

#[async_trait]
impl AssistantStore for MongoStore {
    async fn get_by_id(&self, assistant_id: &str) -> Result<Option<Assistant>> {
        let assistant = self
            .assistants
            .find_one(doc! { "_id": assistant_id })
            .await?;
        Ok(assistant.map(Into::into))
    }
}
