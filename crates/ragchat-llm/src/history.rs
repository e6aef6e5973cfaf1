use serde::{Deserialize, Serialize};

use crate::types::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    System,
    User,
    Assistant,
}

impl HistoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Role-tagged text of one prior turn, in persisted order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

impl HistoryEntry {
    pub fn new(role: HistoryRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

impl From<HistoryEntry> for Message {
    fn from(entry: HistoryEntry) -> Self {
        match entry.role {
            HistoryRole::System => Message::system(entry.text),
            HistoryRole::User => Message::human(entry.text),
            HistoryRole::Assistant => Message::ai(entry.text),
        }
    }
}

/// Ordered history ending with the new user prompt
///
/// Offers the structured form for engines that accept role-tagged turns and a
/// flattened form for prompt templates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatHistory {
    entries: Vec<HistoryEntry>,
}

/// Build the history for a turn: prior entries in order, then the new prompt as `user`
pub fn build_history<I>(prior: I, new_prompt: &str) -> ChatHistory
where
    I: IntoIterator<Item = HistoryEntry>,
{
    let mut entries: Vec<HistoryEntry> = prior.into_iter().collect();
    entries.push(HistoryEntry::new(HistoryRole::User, new_prompt));
    ChatHistory { entries }
}

impl ChatHistory {
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keep at most `past_messages` prior user/assistant entries
    ///
    /// System entries and the final prompt are always retained.
    pub fn window(mut self, past_messages: usize) -> Self {
        let Some(prompt) = self.entries.pop() else {
            return self;
        };

        let conversational = self
            .entries
            .iter()
            .filter(|e| e.role != HistoryRole::System)
            .count();
        let mut to_drop = conversational.saturating_sub(past_messages);

        self.entries.retain(|e| {
            if e.role == HistoryRole::System || to_drop == 0 {
                true
            } else {
                to_drop -= 1;
                false
            }
        });
        self.entries.push(prompt);
        self
    }

    /// The prompt this history was built for
    pub fn prompt(&self) -> Option<&str> {
        self.entries.last().map(|e| e.text.as_str())
    }

    /// Structured form, one message per entry
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().cloned().map(Message::from).collect()
    }

    /// Flattened `role: text` form, one entry per line
    pub fn flatten(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.role.as_str(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Flattened form of everything before the new prompt
    pub fn flatten_prior(&self) -> String {
        let prior = &self.entries[..self.entries.len().saturating_sub(1)];
        prior
            .iter()
            .map(|e| format!("{}: {}", e.role.as_str(), e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<ChatHistory> for Vec<Message> {
    fn from(history: ChatHistory) -> Self {
        history.entries.into_iter().map(Message::from).collect()
    }
}
