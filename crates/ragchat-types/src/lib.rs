pub mod assistant;
pub mod citation;
pub mod frame;
pub mod identity;
pub mod message;
pub mod settings;
pub mod thread;

pub use assistant::Assistant;
pub use citation::Citation;
pub use frame::StreamFrame;
pub use identity::CallerIdentity;
pub use message::{ChatMessage, MessageOptions, MessageRole, Reaction};
pub use settings::{GenerationDefaults, TurnSettings};
pub use thread::{AgentThreadConfig, ChatThread, FilterOptions, PromptOptions, DEFAULT_THREAD_NAME};
