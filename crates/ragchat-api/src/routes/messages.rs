use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use ragchat_types::{ChatMessage, MessageOptions, MessageRole};

use crate::{
    error::{ApiError, ApiResult},
    identity::Caller,
    state::AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub thread_id: String,
    pub role: MessageRole,
    pub content: String,
    pub options: Vec<MessageOptions>,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessage> for MessageResponse {
    fn from(msg: ChatMessage) -> Self {
        Self {
            message_id: msg.id,
            thread_id: msg.thread_id,
            role: msg.role,
            content: msg.content,
            options: msg.options,
            created_at: msg.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageResponse>,
}

/// List the persisted, non-deleted messages of a thread owned by the caller
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<Json<ListMessagesResponse>> {
    let thread = state
        .threads
        .get_by_id(&thread_id)
        .await?
        .filter(|t| !t.is_deleted)
        .ok_or_else(|| ApiError::NotFound(format!("thread {}", thread_id)))?;

    if !thread.is_owned_by(&caller.user_id) {
        return Err(ApiError::Forbidden);
    }

    let messages = state
        .messages
        .get_all_by_thread_id(&thread_id)
        .await?
        .into_iter()
        .filter(|m| !m.is_deleted)
        .map(MessageResponse::from)
        .collect();

    Ok(Json(ListMessagesResponse { messages }))
}
