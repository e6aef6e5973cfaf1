use serde::{Deserialize, Serialize};

/// Assistant configuration; read-only to the turn pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assistant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub system_message: String,
    #[serde(default)]
    pub greeting: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strictness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_limit: Option<u32>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl Assistant {
    /// Index this assistant grounds on, if any
    pub fn grounding_index(&self) -> Option<&str> {
        self.index_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}
