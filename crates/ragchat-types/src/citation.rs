use ragchat_llm::ContextCitation;
use ragchat_search::SearchHit;
use serde::{Deserialize, Serialize};

/// A retrieved chunk supporting part of an answer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk text
    pub content: String,
    /// Source locator (URL or storage path)
    pub url: String,
    /// Display name
    pub name: String,
}

impl Citation {
    pub fn new(name: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            url: url.into(),
            name: name.into(),
        }
    }

    /// Identity used when merging citations from several sources
    pub fn dedup_key(&self) -> (&str, &str) {
        (&self.name, &self.url)
    }
}

impl From<SearchHit> for Citation {
    fn from(hit: SearchHit) -> Self {
        Self {
            content: hit.content,
            url: hit.url,
            name: hit.name,
        }
    }
}

impl From<ContextCitation> for Citation {
    fn from(c: ContextCitation) -> Self {
        let url = c.url.or(c.filepath).unwrap_or_default();
        let name = c.title.unwrap_or_else(|| url.clone());
        Self {
            content: c.content,
            url,
            name,
        }
    }
}
