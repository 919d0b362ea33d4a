mod strategy;

pub use strategy::RerankStrategy;

use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::models::{CombinedResult, RerankedResult};

/// Re-scores candidate results via closed-form strategies (C6, §4.6). No LLM
/// call is involved despite the wire-level "llm" alias for the embedding
/// strategy — it is cosine similarity against the query embedding.
pub struct Reranker<'a> {
    embedder: &'a EmbeddingProvider,
}

impl<'a> Reranker<'a> {
    pub fn new(embedder: &'a EmbeddingProvider) -> Self {
        Self { embedder }
    }

    /// Stable: ties preserve input order, per §4.6.
    pub async fn rerank(
        &self,
        query: &str,
        candidates: &[CombinedResult],
        strategy: RerankStrategy,
    ) -> Result<Vec<RerankedResult>> {
        let mut scored = match strategy {
            RerankStrategy::Text => candidates
                .iter()
                .map(|c| {
                    let (score, details) = strategy::text_score(query, c);
                    (c, score, details)
                })
                .collect::<Vec<_>>(),
            RerankStrategy::Embedding => {
                let query_embedding = self.embedder.embed_single(query).await?;
                let mut out = Vec::with_capacity(candidates.len());
                for c in candidates {
                    let candidate_embedding = self.embedder.embed_single(&strategy::candidate_text(c)).await?;
                    let (score, details) = strategy::embedding_score(&query_embedding, &candidate_embedding, c);
                    out.push((c, score, details));
                }
                out
            }
            RerankStrategy::Hybrid => {
                let query_embedding = self.embedder.embed_single(query).await?;
                let mut out = Vec::with_capacity(candidates.len());
                for c in candidates {
                    let (text_score, mut details) = strategy::text_score(query, c);
                    let candidate_embedding = self.embedder.embed_single(&strategy::candidate_text(c)).await?;
                    let (embedding_score, embedding_details) =
                        strategy::embedding_score(&query_embedding, &candidate_embedding, c);
                    let hybrid = (text_score + embedding_score) / 2.0;
                    details.extend(embedding_details);
                    details.insert("hybrid".to_string(), hybrid);
                    out.push((c, hybrid, details));
                }
                out
            }
        };

        // `sort_by` is stable in std, preserving input order on ties (§4.6).
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .map(|(c, score, details)| RerankedResult {
                memory: c.memory.clone(),
                rerank_score: score,
                rerank_details: details,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingsConfig;
    use crate::models::{Memory, ResultSource};

    fn test_embedder() -> EmbeddingProvider {
        EmbeddingProvider::new(&EmbeddingsConfig {
            model: "BAAI/bge-small-en-v1.5".to_string(),
            dimensions: 384,
            batch_size: 32,
            openai_api_key: None,
        })
        .expect("local embedder should build without network access")
    }

    fn candidate(id: i64, topic: &str, content: &str, score: f32) -> CombinedResult {
        CombinedResult {
            memory: Memory::new(id, "notes", topic, content),
            relevance_score: score,
            sources: vec![ResultSource::Relational],
            graph_enhanced: false,
        }
    }

    #[tokio::test]
    async fn test_text_rerank_preserves_order_on_ties() {
        let embedder = test_embedder();
        let reranker = Reranker::new(&embedder);
        let candidates = vec![
            candidate(1, "alpha", "nothing matches here", 0.5),
            candidate(2, "beta", "nothing matches here either", 0.5),
        ];
        let results = reranker.rerank("zzz_unmatched_token", &candidates, RerankStrategy::Text).await.unwrap();
        assert_eq!(results[0].memory.id, 1);
        assert_eq!(results[1].memory.id, 2);
    }

    #[tokio::test]
    async fn test_text_rerank_favors_overlap() {
        let embedder = test_embedder();
        let reranker = Reranker::new(&embedder);
        let candidates = vec![
            candidate(1, "unrelated", "completely unrelated filler text", 0.5),
            candidate(2, "rust borrow checker", "rust borrow checker ownership rules", 0.5),
        ];
        let results = reranker.rerank("rust borrow checker", &candidates, RerankStrategy::Text).await.unwrap();
        assert_eq!(results[0].memory.id, 2);
    }
}
