use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// In-flight turns by thread id, so a turn can be cancelled from another request
#[derive(Debug, Default)]
pub struct ActiveTurns {
    turns: DashMap<String, (u64, CancellationToken)>,
    next_id: AtomicU64,
}

/// Registration handle; the entry is removed when the turn finishes
#[derive(Debug)]
pub struct TurnTicket {
    pub thread_id: String,
    pub token: CancellationToken,
    id: u64,
}

impl ActiveTurns {
    pub fn new() -> Self {
        Self::default()
    }

    /// A newer turn on the same thread replaces the older entry
    pub fn register(&self, thread_id: &str) -> TurnTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.turns
            .insert(thread_id.to_string(), (id, token.clone()));
        TurnTicket {
            thread_id: thread_id.to_string(),
            token,
            id,
        }
    }

    /// Returns false when no turn is running on the thread
    pub fn cancel(&self, thread_id: &str) -> bool {
        match self.turns.get(thread_id) {
            Some(entry) => {
                entry.value().1.cancel();
                true
            }
            None => false,
        }
    }

    pub fn finish(&self, ticket: &TurnTicket) {
        self.turns
            .remove_if(&ticket.thread_id, |_, (id, _)| *id == ticket.id);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
