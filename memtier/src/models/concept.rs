use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::MemoryType;

/// Derived from a memory by the analyzer (§3). Lifetime is tied to the
/// source memory; on memory deletion, concepts are best-effort purged from
/// the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub title: String,
    pub description: String,
    pub memory_type: MemoryType,
    pub confidence: f32,
    pub mood: Option<String>,
    pub keywords: HashSet<String>,
    pub extracted_concepts: Vec<String>,
}

impl Concept {
    /// Empty descriptions are dropped before vector write (§4.2, Property 4).
    pub fn has_nonempty_description(&self) -> bool {
        !self.description.trim().is_empty()
    }

    /// Fallback concept used when `classify_and_extract` fails (§4.5): one
    /// concept built directly from the memory's own topic/content.
    pub fn fallback(topic: &str, content: &str) -> Self {
        Self {
            title: topic.to_string(),
            description: content.to_string(),
            memory_type: MemoryType::Factual,
            confidence: 0.5,
            mood: None,
            keywords: HashSet::new(),
            extracted_concepts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_nonempty_description() {
        let mut c = Concept::fallback("topic", "content");
        assert!(c.has_nonempty_description());
        c.description = "   ".to_string();
        assert!(!c.has_nonempty_description());
    }

    #[test]
    fn test_fallback_confidence() {
        let c = Concept::fallback("t", "c");
        assert_eq!(c.confidence, 0.5);
        assert_eq!(c.memory_type, MemoryType::Factual);
    }
}
