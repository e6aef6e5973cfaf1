use std::sync::Arc;

use ragchat_orchestrator::Orchestrator;
use ragchat_persist::{MessageStore, ThreadStore};

use crate::config::Config;
use crate::turns::ActiveTurns;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub threads: Arc<dyn ThreadStore>,
    pub messages: Arc<dyn MessageStore>,
    pub active_turns: Arc<ActiveTurns>,
    /// Name of the backing store, reported by the health check
    pub store_kind: &'static str,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Orchestrator,
        threads: Arc<dyn ThreadStore>,
        messages: Arc<dyn MessageStore>,
        store_kind: &'static str,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            threads,
            messages,
            active_turns: Arc::new(ActiveTurns::new()),
            store_kind,
        }
    }
}
