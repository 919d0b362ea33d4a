use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stored in the vector store (§3). `doc_id` is stable within a single write
/// and never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub doc_id: String,
    pub document: String,
    pub embedding: Vec<f32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VectorRecord {
    pub fn doc_id_for(memory_id: i64, concept_index: usize, created_at_ts: i64) -> String {
        format!("memory_{memory_id}_concept_{concept_index}_{created_at_ts}")
    }
}

/// One hit from `search_similar` (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub memory_id: i64,
    pub score: f32,
    pub metadata: HashMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_id_scheme() {
        let id = VectorRecord::doc_id_for(42, 1, 1700000000);
        assert_eq!(id, "memory_42_concept_1_1700000000");
    }
}
