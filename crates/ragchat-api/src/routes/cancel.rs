use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::{
    error::{ApiError, ApiResult},
    identity::Caller,
    state::AppState,
};

/// Cancel the in-flight turn on a thread
///
/// The turn stops generating, persists what it has and closes its stream with
/// a cancelled `done` frame.
pub async fn cancel_turn(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Caller(caller): Caller,
) -> ApiResult<StatusCode> {
    let thread = state
        .threads
        .get_by_id(&thread_id)
        .await?
        .filter(|t| !t.is_deleted)
        .ok_or_else(|| ApiError::NotFound(format!("thread {}", thread_id)))?;

    if !thread.is_owned_by(&caller.user_id) {
        return Err(ApiError::Forbidden);
    }

    if state.active_turns.cancel(&thread_id) {
        tracing::info!(thread_id = %thread_id, "Turn cancelled by caller");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no active turn on thread {}", thread_id)))
    }
}
