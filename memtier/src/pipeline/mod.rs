mod relationships;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use crate::analyzer::SemanticAnalyzer;
use crate::db::RelationalStore;
use crate::embeddings::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::graph::GraphStore;
use crate::models::{
    CombinedResult, Concept, ForcedRelationship, GraphData, GraphEdgeType, GraphStatistics, Memory,
    MemoryUpdate, ResultSource, SaveReceipt, SearchResult, SearchStrategy, UpdateOutcome, VectorMatch,
    CATEGORY_CORE_MEMORIES, NO_RELATIONAL_ROW,
};
use crate::reranker::{RerankStrategy, Reranker};
use crate::vector::VectorStore;

/// Top-k fetched from the vector store per `search_intelligent` call (§4.7.3).
const VECTOR_SEARCH_TOP_K: u32 = 20;
/// How many of the base search's top results feed graph enrichment (§4.7.4).
const GRAPH_ENRICH_SEED_COUNT: usize = 5;
/// Decay applied per BFS hop when scoring graph-enhanced neighbors (§4.7.4).
const GRAPH_ENRICH_DECAY: f32 = 0.7;
/// Bonus added to graph-enhanced neighbor scores when sorting (§4.7.4).
const GRAPH_ENRICH_BONUS: f32 = 0.1;
/// Hard cap on `search_with_graph` output (§4.7.4).
const GRAPH_SEARCH_RESULT_CAP: usize = 50;
/// Fixed relevance score assigned to relational-only hits (§4.7.3).
const RELATIONAL_ONLY_SCORE: f32 = 0.5;

/// The core orchestrator (C7, §4.7): the only component that touches every
/// backend in a single call. Holds no mutable state of its own — all shared
/// state lives in the stores it wraps.
pub struct Pipeline {
    relational: Arc<dyn RelationalStore>,
    vector: Arc<VectorStore>,
    graph: Arc<GraphStore>,
    analyzer: Arc<SemanticAnalyzer>,
    embedder: Arc<EmbeddingProvider>,
}

impl Pipeline {
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vector: Arc<VectorStore>,
        graph: Arc<GraphStore>,
        analyzer: Arc<SemanticAnalyzer>,
        embedder: Arc<EmbeddingProvider>,
    ) -> Self {
        Self {
            relational,
            vector,
            graph,
            analyzer,
            embedder,
        }
    }

    /// `save(category, topic, content, force_relationships?)` (§4.7.1).
    pub async fn save(
        &self,
        category: &str,
        topic: &str,
        content: &str,
        force_relationships: &[ForcedRelationship],
    ) -> Result<SaveReceipt> {
        if category.trim().is_empty() || topic.trim().is_empty() || content.trim().is_empty() {
            return Err(PipelineError::Validation(
                "category, topic, and content are required".to_string(),
            ));
        }

        if category == CATEGORY_CORE_MEMORIES {
            self.save_core(category, topic, content, force_relationships).await
        } else {
            self.save_advanced(category, topic, content, force_relationships).await
        }
    }

    /// Path A: the reserved `core_memories` category always keeps its
    /// relational row and is always added to short-memory (§4.7.1).
    async fn save_core(
        &self,
        category: &str,
        topic: &str,
        content: &str,
        force_relationships: &[ForcedRelationship],
    ) -> Result<SaveReceipt> {
        let memory = self.relational.save_memory(category, topic, content).await?;

        if let Err(error) = self.relational.add_to_short_memory(&memory).await {
            tracing::warn!(%error, memory_id = memory.id, "failed to add core memory to short-memory cache");
        }

        let classification = self.analyzer.classify_and_extract(&memory).await;
        let stored_in_vector = self.enrich_vector(&memory, &classification.concepts).await;
        let (stored_in_graph, relationships_created) = self
            .enrich_graph(&memory, memory.id, &classification.concepts, force_relationships)
            .await;

        Ok(SaveReceipt {
            memory_id: memory.id,
            memory_type: classification.memory_type,
            kept_in_relational: true,
            in_short_memory: true,
            stored_in_vector,
            stored_in_graph,
            relationships_created,
            significance_reason: None,
        })
    }

    /// Path B: the six-phase advanced pipeline (§4.7.1) — provisional write,
    /// analyze, vector enrich, route by classified type, graph enrich, return.
    async fn save_advanced(
        &self,
        category: &str,
        topic: &str,
        content: &str,
        force_relationships: &[ForcedRelationship],
    ) -> Result<SaveReceipt> {
        let memory = self.relational.save_memory(category, topic, content).await?;
        let classification = self.analyzer.classify_and_extract(&memory).await;
        let memory_type = classification.memory_type;
        let concepts = classification.concepts;

        let stored_in_vector = self.enrich_vector(&memory, &concepts).await;

        let (kept_in_relational, in_short_memory, significance_reason, final_id) =
            if memory_type.always_discards_from_relational() {
                if let Err(error) = self.relational.delete(memory.id).await {
                    tracing::warn!(%error, memory_id = memory.id, "failed to discard non-kept memory");
                }
                (false, false, None, NO_RELATIONAL_ROW)
            } else {
                let significance = self.analyzer.evaluate_significance(&memory, memory_type).await;
                if significance.significant {
                    (true, false, Some(significance.reason), memory.id)
                } else {
                    if let Err(error) = self.relational.delete(memory.id).await {
                        tracing::warn!(%error, memory_id = memory.id, "failed to discard non-significant memory");
                    }
                    if let Err(error) = self.relational.add_to_short_memory(&memory).await {
                        tracing::warn!(%error, memory_id = memory.id, "failed to add to short-memory cache");
                    }
                    (false, true, Some(significance.reason), NO_RELATIONAL_ROW)
                }
            };

        let (stored_in_graph, relationships_created) = self
            .enrich_graph(&memory, final_id, &concepts, force_relationships)
            .await;

        Ok(SaveReceipt {
            memory_id: final_id,
            memory_type,
            kept_in_relational,
            in_short_memory,
            stored_in_vector,
            stored_in_graph,
            relationships_created,
            significance_reason,
        })
    }

    /// Best-effort; failures here never fail the surrounding save (§4.7.1).
    async fn enrich_vector(&self, memory: &Memory, concepts: &[Concept]) -> bool {
        match self.vector.store_concepts(memory, concepts, &self.embedder).await {
            Ok((stored, errors)) => {
                for error in errors {
                    tracing::warn!(%error, memory_id = memory.id, "vector enrichment partial failure");
                }
                stored > 0
            }
            Err(error) => {
                tracing::warn!(%error, memory_id = memory.id, "vector enrichment failed");
                false
            }
        }
    }

    /// Best-effort graph upsert + relationship discovery (§4.7.1, §4.7.2).
    /// `final_id` is the original id when the memory was kept, or the `0`
    /// sentinel when it was discarded from the relational store.
    async fn enrich_graph(
        &self,
        memory: &Memory,
        final_id: i64,
        concepts: &[Concept],
        force_relationships: &[ForcedRelationship],
    ) -> (bool, u32) {
        let node_memory = Memory {
            id: final_id,
            ..memory.clone()
        };
        let concepts_blob = relationships::concepts_blob(concepts);

        if let Err(error) = self.graph.upsert_node(&node_memory, &concepts_blob).await {
            tracing::warn!(%error, memory_id = final_id, "graph upsert failed");
            return (false, 0);
        }

        match relationships::discover_and_link(
            &self.graph,
            &final_id.to_string(),
            &node_memory,
            concepts,
            force_relationships,
        )
        .await
        {
            Ok(created) => (true, created),
            Err(error) => {
                tracing::warn!(%error, memory_id = final_id, "relationship discovery failed");
                (true, 0)
            }
        }
    }

    /// `search_intelligent(query, categories?, rerank?, strategy?)` (§4.7.3).
    /// Never returns an `Err`; all-backends-down is reported via
    /// `SearchResult::failure`.
    pub async fn search_intelligent(
        &self,
        query: &str,
        categories: &[String],
        rerank: bool,
        strategy: Option<RerankStrategy>,
    ) -> SearchResult {
        if query.trim().is_empty() {
            return SearchResult::failure("query must not be empty");
        }

        let (relational_res, vector_res) = tokio::join!(
            self.relational.search_basic(query, categories),
            self.vector.search_similar(&self.embedder, query, VECTOR_SEARCH_TOP_K, None)
        );

        let relational_ok = relational_res.is_ok();
        let relational_rows = match relational_res {
            Ok(rows) => rows,
            Err(error) => {
                tracing::warn!(%error, "relational search failed, degrading");
                Vec::new()
            }
        };

        let vector_ok = vector_res.is_ok();
        let vector_matches = match vector_res {
            Ok(matches) => matches,
            Err(error) => {
                tracing::warn!(%error, "vector search failed, degrading");
                Vec::new()
            }
        };

        if !relational_ok && !vector_ok {
            return SearchResult::failure("all backends unavailable");
        }

        let search_strategy = if !vector_ok {
            SearchStrategy::RelationalOnly
        } else if relational_rows.is_empty() {
            SearchStrategy::VectorOnly
        } else {
            SearchStrategy::Hybrid
        };

        let vector_results = combine_results(&[], &vector_matches, categories);
        let mut combined_results = combine_results(&relational_rows, &vector_matches, categories);
        combined_results
            .sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap_or(std::cmp::Ordering::Equal));

        let (rerank_strategy, reranked_results) = if rerank {
            let chosen = strategy.unwrap_or(RerankStrategy::Hybrid);
            let reranker = Reranker::new(&self.embedder);
            match reranker.rerank(query, &combined_results, chosen).await {
                Ok(results) => (Some(chosen.to_string()), Some(results)),
                Err(error) => {
                    tracing::warn!(%error, "rerank failed, falling back to relevance_score ordering");
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        SearchResult {
            success: true,
            error: None,
            search_strategy: Some(search_strategy),
            rerank_strategy,
            relational_results: relational_rows,
            vector_results,
            combined_results,
            reranked_results,
        }
    }

    /// `search_with_graph(query, categories?, include_related=true, max_depth=2)` (§4.7.4).
    pub async fn search_with_graph(
        &self,
        query: &str,
        categories: &[String],
        include_related: bool,
        max_depth: u32,
    ) -> SearchResult {
        let mut base = self.search_intelligent(query, categories, false, None).await;
        if !base.success || !include_related {
            return base;
        }

        let depth = max_depth.clamp(1, 4);
        let mut seen: HashSet<i64> = base.combined_results.iter().map(|r| r.memory.id).collect();

        let seeds: Vec<(i64, f32)> = base
            .combined_results
            .iter()
            .take(GRAPH_ENRICH_SEED_COUNT)
            .map(|r| (r.memory.id, r.relevance_score))
            .collect();

        let mut enriched = Vec::new();
        for (seed_id, seed_score) in seeds {
            let center = seed_id.to_string();
            let related = match self.graph.find_related(&center, depth, None).await {
                Ok(data) => data,
                Err(error) => {
                    tracing::warn!(%error, seed_id, "graph enrichment failed for seed");
                    continue;
                }
            };

            let depths = neighbor_depths(&related, &center);

            for node in related.nodes {
                let Ok(node_id) = node.id.parse::<i64>() else { continue };
                if !seen.insert(node_id) {
                    continue;
                }

                let hop = *depths.get(&node.id).unwrap_or(&1);
                let score = seed_score * GRAPH_ENRICH_DECAY.powi(hop as i32);

                enriched.push(CombinedResult {
                    memory: Memory {
                        id: node_id,
                        created_at: node.created_at,
                        date: node.created_at.date_naive(),
                        category: node.category,
                        topic: node.topic,
                        content: node.content_head,
                    },
                    relevance_score: score,
                    sources: Vec::new(),
                    graph_enhanced: true,
                });
            }
        }

        base.combined_results.extend(enriched);
        base.combined_results.sort_by(|a, b| {
            let score_a = a.relevance_score + if a.graph_enhanced { GRAPH_ENRICH_BONUS } else { 0.0 };
            let score_b = b.relevance_score + if b.graph_enhanced { GRAPH_ENRICH_BONUS } else { 0.0 };
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        base.combined_results.truncate(GRAPH_SEARCH_RESULT_CAP);

        base
    }

    /// `update(id, fields)` (§4.7.5). Touches only the relational store.
    pub async fn update(&self, id: i64, update: &MemoryUpdate) -> Result<UpdateOutcome> {
        if update.is_empty() {
            return Err(PipelineError::Validation("at least one field must be provided".to_string()));
        }
        let ok = self.relational.update(id, update).await?;
        Ok(if ok { UpdateOutcome::applied() } else { UpdateOutcome::not_found() })
    }

    /// `move(id, cat)` (§4.7.5). Touches only the relational store.
    pub async fn move_memory(&self, id: i64, new_category: &str) -> Result<UpdateOutcome> {
        if new_category.trim().is_empty() {
            return Err(PipelineError::Validation("new_category must not be empty".to_string()));
        }
        let ok = self.relational.move_category(id, new_category).await?;
        Ok(if ok { UpdateOutcome::applied() } else { UpdateOutcome::not_found() })
    }

    /// `graph_context(id, depth, edge_types?)` (§4.7.6).
    pub async fn graph_context(
        &self,
        id: i64,
        depth: u32,
        edge_types: Option<&[GraphEdgeType]>,
    ) -> Result<GraphData> {
        if !(1..=4).contains(&depth) {
            return Err(PipelineError::Validation("depth must be between 1 and 4".to_string()));
        }
        self.graph.find_related(&id.to_string(), depth, edge_types).await
    }

    /// `graph_stats()` (§4.7.6).
    pub async fn graph_stats(&self) -> Result<GraphStatistics> {
        self.graph.statistics().await
    }

    pub fn relational(&self) -> &dyn RelationalStore {
        self.relational.as_ref()
    }

    pub fn graph_store(&self) -> &GraphStore {
        &self.graph
    }

    pub fn analyzer(&self) -> &SemanticAnalyzer {
        &self.analyzer
    }
}

/// Merges relational rows and vector matches into deduplicated
/// `CombinedResult`s (§4.7.3, step 3). Relational items default to
/// `relevance_score = 0.5`; vector-only items carry their similarity score
/// and are synthesized from vector metadata when no relational row backs
/// them (e.g. memories discarded from the relational store at save time).
fn combine_results(relational_rows: &[Memory], vector_matches: &[VectorMatch], categories: &[String]) -> Vec<CombinedResult> {
    let mut combined: HashMap<i64, CombinedResult> = HashMap::new();

    for memory in relational_rows {
        combined.insert(
            memory.id,
            CombinedResult {
                memory: memory.clone(),
                relevance_score: RELATIONAL_ONLY_SCORE,
                sources: vec![ResultSource::Relational],
                graph_enhanced: false,
            },
        );
    }

    for vector_match in vector_matches {
        if !categories.is_empty() {
            let matches_category = vector_match
                .metadata
                .get("source_category")
                .and_then(Value::as_str)
                .map(|c| categories.iter().any(|cat| cat == c))
                .unwrap_or(false);
            if !matches_category {
                continue;
            }
        }

        match combined.get_mut(&vector_match.memory_id) {
            Some(existing) => {
                if vector_match.score > existing.relevance_score {
                    existing.relevance_score = vector_match.score;
                }
                if !existing.sources.contains(&ResultSource::Vector) {
                    existing.sources.push(ResultSource::Vector);
                }
            }
            None => {
                let Some(memory) = memory_from_vector_match(vector_match) else {
                    continue;
                };
                combined.insert(
                    vector_match.memory_id,
                    CombinedResult {
                        memory,
                        relevance_score: vector_match.score,
                        sources: vec![ResultSource::Vector],
                        graph_enhanced: false,
                    },
                );
            }
        }
    }

    combined.into_values().collect()
}

/// Synthesizes a `Memory` from a vector record's metadata when the original
/// relational row no longer exists (factual/procedural memories are
/// physically deleted after vector enrichment, §4.7.1). `content` falls back
/// to the extracted concept title since the original content isn't stored in
/// vector metadata.
fn memory_from_vector_match(vector_match: &VectorMatch) -> Option<Memory> {
    let get_str = |k: &str| vector_match.metadata.get(k).and_then(Value::as_str).map(str::to_string);

    let category = get_str("source_category")?;
    let topic = get_str("source_topic")?;
    let date_str = get_str("source_date")?;
    let created_at_str = get_str("created_at")?;
    let title = get_str("title").unwrap_or_default();

    let date = chrono::NaiveDate::parse_from_str(&date_str, "%Y-%m-%d").ok()?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
        .ok()?
        .with_timezone(&chrono::Utc);

    Some(Memory {
        id: vector_match.memory_id,
        created_at,
        date,
        category,
        topic,
        content: title,
    })
}

/// BFS hop count from `center` to every node in an already-fetched
/// `GraphData`, used to score graph-enhanced neighbors by depth (§4.7.4).
fn neighbor_depths(data: &GraphData, center: &str) -> HashMap<String, u32> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &data.edges {
        adjacency.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        adjacency.entry(edge.target.as_str()).or_default().push(edge.source.as_str());
    }

    let mut depths = HashMap::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(center.to_string());
    let mut queue = VecDeque::new();
    queue.push_back((center.to_string(), 0u32));

    while let Some((node, d)) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(node.as_str()) {
            for &next in neighbors {
                if visited.insert(next.to_string()) {
                    depths.insert(next.to_string(), d + 1);
                    queue.push_back((next.to_string(), d + 1));
                }
            }
        }
    }

    depths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultSource;

    fn memory(id: i64, category: &str) -> Memory {
        Memory::new(id, category, "topic", "content")
    }

    #[test]
    fn test_combine_results_prefers_relational_then_tags_vector_source() {
        let relational = vec![memory(1, "debug")];
        let vector_matches = vec![VectorMatch {
            memory_id: 1,
            score: 0.9,
            metadata: HashMap::new(),
        }];

        let combined = combine_results(&relational, &vector_matches, &[]);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].relevance_score, 0.9);
        assert!(combined[0].sources.contains(&ResultSource::Relational));
        assert!(combined[0].sources.contains(&ResultSource::Vector));
    }

    #[test]
    fn test_combine_results_synthesizes_vector_only_memory() {
        let mut metadata = HashMap::new();
        metadata.insert("source_category".to_string(), serde_json::json!("debug"));
        metadata.insert("source_topic".to_string(), serde_json::json!("TLS fix"));
        metadata.insert("source_date".to_string(), serde_json::json!("2026-01-01"));
        metadata.insert("created_at".to_string(), serde_json::json!("2026-01-01T00:00:00Z"));
        metadata.insert("title".to_string(), serde_json::json!("TLS rotation"));

        let vector_matches = vec![VectorMatch {
            memory_id: 7,
            score: 0.8,
            metadata,
        }];

        let combined = combine_results(&[], &vector_matches, &[]);
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].memory.id, 7);
        assert_eq!(combined[0].memory.category, "debug");
        assert_eq!(combined[0].sources, vec![ResultSource::Vector]);
    }

    #[test]
    fn test_neighbor_depths_counts_hops() {
        let data = GraphData {
            nodes: Vec::new(),
            edges: vec![
                crate::models::GraphEdge {
                    source: "1".to_string(),
                    target: "2".to_string(),
                    edge_type: GraphEdgeType::RelatedTo,
                    strength: None,
                },
                crate::models::GraphEdge {
                    source: "2".to_string(),
                    target: "3".to_string(),
                    edge_type: GraphEdgeType::RelatedTo,
                    strength: None,
                },
            ],
        };

        let depths = neighbor_depths(&data, "1");
        assert_eq!(depths.get("2"), Some(&1));
        assert_eq!(depths.get("3"), Some(&2));
    }
}
