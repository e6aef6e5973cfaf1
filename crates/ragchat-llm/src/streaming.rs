use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use anyhow::Result;
use futures::{Stream, StreamExt};
use reqwest::Response;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text fragment of the assistant answer
    Message {
        content: String,
    },

    /// Message context surfaced by the engine's own retrieval layer
    Context {
        citations: Vec<ContextCitation>,
    },

    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

/// Citation as reported inside `delta.context` by Azure OpenAI "On Your Data"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextCitation {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Delta {
    pub role: Option<String>,
    pub content: Option<String>,
    pub context: Option<DeltaContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaContext {
    #[serde(default)]
    pub citations: Vec<ContextCitation>,
}

impl ChatStreamChunk {
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.delta.content.as_deref())
    }

    pub fn is_done(&self) -> bool {
        self.choices
            .first()
            .and_then(|c| c.finish_reason.as_ref())
            .is_some()
    }

    pub fn to_stream_events(&self) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        // Azure sends a leading chunk with prompt filter results and no choices
        let Some(choice) = self.choices.first() else {
            return events;
        };

        if let Some(context) = &choice.delta.context {
            if !context.citations.is_empty() {
                events.push(StreamEvent::Context {
                    citations: context.citations.clone(),
                });
            }
        }

        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                events.push(StreamEvent::Message {
                    content: content.clone(),
                });
            }
        }

        if let Some(finish_reason) = &choice.finish_reason {
            events.push(StreamEvent::Done {
                finish_reason: Some(finish_reason.clone()),
            });
        }

        events
    }
}

pub fn parse_chat_sse_stream(
    response: Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>> {
    parse_chat_sse_bytes(response.bytes_stream())
}

/// Parse a raw SSE byte stream of chat completion chunks into stream events
pub fn parse_chat_sse_bytes<S, B, E>(
    stream: S,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut byte_chunks = Box::pin(stream);
        let mut buffer: VecDeque<u8> = VecDeque::with_capacity(8192);

        'outer: while let Some(chunk_result) = byte_chunks.next().await {
            match chunk_result {
                Ok(bytes) => {
                    buffer.extend(bytes.as_ref().iter().copied());

                    while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line_bytes: Vec<u8> = buffer.drain(..=newline_pos).collect();

                        let Ok(line_str) = std::str::from_utf8(&line_bytes) else {
                            continue;
                        };
                        let line = line_str.trim();

                        if line.is_empty() {
                            continue;
                        }

                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim_start();

                        if data == "[DONE]" {
                            break 'outer;
                        }

                        match serde_json::from_str::<ChatStreamChunk>(data) {
                            Ok(chunk) => {
                                for event in chunk.to_stream_events() {
                                    yield Ok(event);
                                }
                            }
                            Err(e) => yield Err(anyhow::anyhow!("Failed to parse chat chunk: {}", e)),
                        }
                    }
                }
                Err(e) => {
                    yield Err(anyhow::anyhow!("Stream error: {}", e));
                    break;
                }
            }
        }
    })
}
