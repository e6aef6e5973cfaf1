use std::fmt;

use ragchat_persist::PersistError;
use thiserror::Error;

/// Write that failed when a turn could not be saved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    UserMessage,
    AssistantMessage,
    ThreadUpdate,
}

impl fmt::Display for PersistStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::UserMessage => "user message",
            Self::AssistantMessage => "assistant message",
            Self::ThreadUpdate => "thread update",
        };
        f.write_str(stage)
    }
}

#[derive(Error, Debug)]
pub enum TurnError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Thread not found: {0}")]
    NotFound(String),

    #[error("Caller does not own this thread")]
    Forbidden,

    #[error("Retrieval failed: {0:#}")]
    Retrieval(anyhow::Error),

    #[error("Generation failed: {message}")]
    Generation {
        message: String,
        /// Whether the partial answer was saved
        partial_persisted: bool,
    },

    #[error("Failed to save {stage}: {source}")]
    Persistence {
        stage: PersistStage,
        #[source]
        source: PersistError,
    },

    #[error("Store error: {0}")]
    Store(#[from] PersistError),
}

impl TurnError {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Forbidden => "forbidden",
            Self::Retrieval(_) => "retrieval",
            Self::Generation { .. } => "generation",
            Self::Persistence { .. } => "persistence",
            Self::Store(_) => "store",
        }
    }

    /// Text shown to the caller in an error frame
    pub fn client_message(&self) -> String {
        match self {
            Self::Generation {
                partial_persisted: true,
                ..
            } => "The answer was interrupted by a model error; the partial answer was saved.".to_string(),
            Self::Generation { .. } => {
                "The answer was interrupted by a model error and could not be saved.".to_string()
            }
            Self::Persistence {
                stage: PersistStage::ThreadUpdate,
                ..
            } => "The conversation was saved but the thread details could not be updated.".to_string(),
            Self::Persistence { .. } => {
                "The answer could not be saved and may not survive a refresh.".to_string()
            }
            Self::Retrieval(_) => "Searching the knowledge base failed; no answer was generated.".to_string(),
            other => other.to_string(),
        }
    }
}
