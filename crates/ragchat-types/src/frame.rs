use serde::{Deserialize, Serialize};

use crate::citation::Citation;

/// Frame delivered to the caller while a turn runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    TextDelta {
        content: String,
    },

    /// Sent at most once, after every text frame
    Citations {
        citations: Vec<Citation>,
    },

    Error {
        message: String,
    },

    Done {
        thread_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        cancelled: bool,
    },
}

impl StreamFrame {
    pub fn text(content: impl Into<String>) -> Self {
        Self::TextDelta {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Event name used when the frame travels over SSE
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::Citations { .. } => "citations",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }
}
