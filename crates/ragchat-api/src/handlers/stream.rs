use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use ragchat_orchestrator::{ChannelSink, TurnError, TurnOutcome, TurnRequest};
use ragchat_types::StreamFrame;

use crate::{error::ApiResult, identity::Caller, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Run a chat turn and stream its frames as Server-Sent Events
///
/// Validation, lookup and ownership failures are answered as JSON errors before
/// the stream opens. Once streaming starts the turn runs in its own task and
/// completes even if the client goes away.
pub async fn send_message_stream(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Caller(caller): Caller,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let turn = state
        .orchestrator
        .prepare(TurnRequest::new(thread_id.clone(), req.content), &caller)
        .await?;

    let ticket = state.active_turns.register(&thread_id);
    let (mut sink, rx) = ChannelSink::channel(state.config.turn.channel_capacity);

    let task_state = Arc::clone(&state);
    tokio::spawn(async move {
        let token = ticket.token.clone();
        let result = task_state.orchestrator.run(turn, &mut sink, token).await;
        log_turn_result(&ticket.thread_id, &result);
        task_state.active_turns.finish(&ticket);
    });

    let stream = ReceiverStream::new(rx).map(|frame| Ok(to_event(&frame)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Failures were already sent to the client as an error frame
fn log_turn_result(thread_id: &str, result: &Result<TurnOutcome, TurnError>) {
    match result {
        Ok(outcome) => tracing::debug!(
            thread_id = %thread_id,
            message_id = %outcome.assistant_message.id,
            cancelled = outcome.cancelled,
            citations = outcome.citations.len(),
            "Streamed turn finished"
        ),
        Err(e) => tracing::debug!(
            thread_id = %thread_id,
            kind = e.kind(),
            error = %e,
            "Streamed turn failed"
        ),
    }
}

fn to_event(frame: &StreamFrame) -> Event {
    Event::default()
        .event(frame.event_name())
        .json_data(frame)
        .unwrap_or_else(|e| {
            tracing::error!("Failed to serialize stream frame: {}", e);
            Event::default()
                .event("error")
                .data(r#"{"type":"error","message":"Failed to encode response"}"#)
        })
}

