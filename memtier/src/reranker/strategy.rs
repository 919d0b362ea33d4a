use std::collections::{HashMap, HashSet};

use crate::models::CombinedResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerankStrategy {
    Text,
    Embedding,
    Hybrid,
}

impl std::fmt::Display for RerankStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Text => "text",
            Self::Embedding => "embedding",
            Self::Hybrid => "hybrid",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RerankStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "embedding" | "llm" => Ok(Self::Embedding),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown rerank strategy: {other}")),
        }
    }
}

const CONTENT_HEAD_LEN: usize = 200;

/// The text a candidate is embedded against for the `embedding`/`hybrid`
/// strategies: topic plus a content head, since combined results don't carry
/// a concept description at this layer (§4.6).
pub fn candidate_text(candidate: &CombinedResult) -> String {
    let head: String = candidate.memory.content.chars().take(CONTENT_HEAD_LEN).collect();
    format!("{} {}", candidate.memory.topic, head)
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

pub fn text_score(query: &str, candidate: &CombinedResult) -> (f32, HashMap<String, f32>) {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(&candidate_text(candidate));
    let jaccard_score = jaccard(&query_tokens, &candidate_tokens);
    let score = (0.5 * jaccard_score + 0.5 * candidate.relevance_score).clamp(0.0, 1.0);

    let mut details = HashMap::new();
    details.insert("jaccard".to_string(), jaccard_score);
    details.insert("original".to_string(), candidate.relevance_score);
    (score, details)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

pub fn embedding_score(
    query_embedding: &[f32],
    candidate_embedding: &[f32],
    candidate: &CombinedResult,
) -> (f32, HashMap<String, f32>) {
    let cosine_score = cosine(query_embedding, candidate_embedding).max(0.0);
    let score = (0.7 * cosine_score + 0.3 * candidate.relevance_score).clamp(0.0, 1.0);

    let mut details = HashMap::new();
    details.insert("cosine".to_string(), cosine_score);
    details.insert("original".to_string(), candidate.relevance_score);
    (score, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rerank_strategy_parses_llm_alias_as_embedding() {
        assert_eq!("llm".parse::<RerankStrategy>().unwrap(), RerankStrategy::Embedding);
    }

    #[test]
    fn test_rerank_strategy_display_round_trips() {
        for s in [RerankStrategy::Text, RerankStrategy::Embedding, RerankStrategy::Hybrid] {
            assert_eq!(s.to_string().parse::<RerankStrategy>().unwrap(), s);
        }
    }

    #[test]
    fn test_jaccard_identical_sets() {
        let a = tokenize("rust ownership model");
        let b = tokenize("rust ownership model");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        assert_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
