pub mod types;
pub mod traits;
pub mod streaming;
pub mod history;
pub mod config;
pub mod azure_openai;

pub use traits::{
    ChatClient,
    EmbeddingClient,
    ChatRequest, ChatOptions,
    EventStream,
};

pub use streaming::{StreamEvent, ContextCitation};
pub use history::{build_history, ChatHistory, HistoryEntry, HistoryRole};
pub use azure_openai::AzureOpenAIClient;
pub use types::{Message, Content};
