pub mod builder;
pub mod citations;
pub mod error;
pub mod orchestrator;
pub mod retrieval;
pub mod retry;
pub mod sink;
pub mod template;
pub mod title;

pub use builder::OrchestratorBuilder;
pub use citations::CitationSet;
pub use error::{PersistStage, TurnError};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, PreparedTurn, TurnOutcome, TurnRequest,
    DEFAULT_SINK_WRITE_TIMEOUT,
};
pub use retrieval::{GroundingTarget, Retriever};
pub use retry::RetryPolicy;
pub use sink::{ChannelSink, OutputSink, SinkClosed};
pub use template::{render_grounding_prompt, DEFAULT_GROUNDING_TEMPLATE};
pub use title::{truncate_title, TITLE_MAX_CHARS};

pub use tokio_util::sync::CancellationToken;
