use serde::{Deserialize, Serialize};

use crate::assistant::Assistant;
use crate::thread::PromptOptions;

/// Service-wide generation defaults, used when neither thread nor assistant sets a value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub past_messages: u32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 800,
            past_messages: 10,
        }
    }
}

/// Generation settings resolved for one turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub past_messages: u32,
}

impl TurnSettings {
    /// Thread overrides win, then the assistant, then service defaults
    pub fn resolve(
        prompt: &PromptOptions,
        assistant: Option<&Assistant>,
        defaults: &GenerationDefaults,
    ) -> Self {
        Self {
            temperature: prompt
                .temperature
                .or_else(|| assistant.and_then(|a| a.temperature))
                .unwrap_or(defaults.temperature),
            top_p: prompt
                .top_p
                .or_else(|| assistant.and_then(|a| a.top_p))
                .unwrap_or(defaults.top_p),
            max_tokens: prompt
                .max_tokens
                .or_else(|| assistant.and_then(|a| a.max_tokens))
                .unwrap_or(defaults.max_tokens),
            past_messages: prompt.past_messages.unwrap_or(defaults.past_messages),
        }
    }
}
