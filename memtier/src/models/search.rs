use serde::{Deserialize, Serialize};

use super::Memory;

/// Which backends contributed a given combined result (§4.7.3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Relational,
    Vector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedResult {
    pub memory: Memory,
    pub relevance_score: f32,
    pub sources: Vec<ResultSource>,
    pub graph_enhanced: bool,
}

/// `rerank_details` documents the blended components behind `rerank_score`
/// (§4.6), e.g. `{"jaccard": 0.4, "original": 0.8}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankedResult {
    pub memory: Memory,
    pub rerank_score: f32,
    pub rerank_details: std::collections::HashMap<String, f32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Hybrid,
    VectorOnly,
    RelationalOnly,
}

impl std::fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hybrid => "hybrid",
            Self::VectorOnly => "vector_only",
            Self::RelationalOnly => "relational_only",
        };
        write!(f, "{s}")
    }
}

/// Return value of `search_intelligent` (§4.7.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub success: bool,
    pub error: Option<String>,
    pub search_strategy: Option<SearchStrategy>,
    pub rerank_strategy: Option<String>,
    pub relational_results: Vec<Memory>,
    pub vector_results: Vec<CombinedResult>,
    pub combined_results: Vec<CombinedResult>,
    pub reranked_results: Option<Vec<RerankedResult>>,
}

impl SearchResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            search_strategy: None,
            rerank_strategy: None,
            relational_results: Vec::new(),
            vector_results: Vec::new(),
            combined_results: Vec::new(),
            reranked_results: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_strategy_display() {
        assert_eq!(SearchStrategy::VectorOnly.to_string(), "vector_only");
        assert_eq!(SearchStrategy::RelationalOnly.to_string(), "relational_only");
    }

    #[test]
    fn test_failure_result_has_no_strategy() {
        let result = SearchResult::failure("all backends down");
        assert!(!result.success);
        assert!(result.search_strategy.is_none());
    }
}
