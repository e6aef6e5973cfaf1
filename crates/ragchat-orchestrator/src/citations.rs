use std::collections::HashSet;

use ragchat_types::Citation;

/// Ordered citation collection deduplicated by `(name, url)`; the first occurrence wins
#[derive(Debug, Clone, Default)]
pub struct CitationSet {
    citations: Vec<Citation>,
    seen: HashSet<(String, String)>,
}

impl CitationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when an equal key was already present
    pub fn insert(&mut self, citation: Citation) -> bool {
        let key = (citation.name.clone(), citation.url.clone());
        if !self.seen.insert(key) {
            return false;
        }
        self.citations.push(citation);
        true
    }

    pub fn extend<I: IntoIterator<Item = Citation>>(&mut self, citations: I) {
        for citation in citations {
            self.insert(citation);
        }
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn as_slice(&self) -> &[Citation] {
        &self.citations
    }

    pub fn into_vec(self) -> Vec<Citation> {
        self.citations
    }
}

impl FromIterator<Citation> for CitationSet {
    fn from_iter<I: IntoIterator<Item = Citation>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}
