use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::graph::GraphStore;
use crate::models::{Concept, ForcedRelationship, GraphEdgeType, Memory};

/// Hard cap on edges created per `save` (§4.7.2), forced and discovered
/// together.
const MAX_EDGES_PER_SAVE: usize = 10;
/// Candidates considered from `find_candidates_by_content` before scoring.
const CANDIDATE_TOP_K: u32 = 10;
const CONCEPT_SIMILAR_THRESHOLD: f32 = 0.3;
const RELATED_TO_THRESHOLD: f32 = 0.4;

/// Flattens a memory's extracted concepts into the lowercase term set used for
/// both graph-candidate lookup and concept-overlap scoring.
pub fn concept_terms(concepts: &[Concept]) -> HashSet<String> {
    let mut terms = HashSet::new();
    for concept in concepts {
        for word in concept.title.split_whitespace() {
            terms.insert(word.to_lowercase());
        }
        for keyword in &concept.keywords {
            terms.insert(keyword.to_lowercase());
        }
    }
    terms
}

/// The blob stored as `graph_nodes.concepts`, also re-parsed by later saves
/// for concept-overlap scoring against this node.
pub fn concepts_blob(concepts: &[Concept]) -> String {
    concept_terms(concepts).into_iter().collect::<Vec<_>>().join(" ")
}

/// Discovers related memories for a newly saved node and creates graph edges
/// for them (§4.7.2), honoring caller-supplied `force_relationships` first.
/// Returns the number of edges created, capped at `MAX_EDGES_PER_SAVE`.
pub async fn discover_and_link(
    graph: &GraphStore,
    node_id: &str,
    memory: &Memory,
    concepts: &[Concept],
    force_relationships: &[ForcedRelationship],
) -> Result<u32> {
    let mut created = 0u32;

    for forced in force_relationships.iter().take(MAX_EDGES_PER_SAVE) {
        graph
            .create_edge(node_id, &forced.target_memory_id.to_string(), forced.edge_type, forced.strength)
            .await?;
        created += 1;
    }

    if created as usize >= MAX_EDGES_PER_SAVE {
        return Ok(created);
    }

    let own_terms = concept_terms(concepts);
    if own_terms.is_empty() {
        return Ok(created);
    }

    let query_text = own_terms.iter().cloned().collect::<Vec<_>>().join(" ");
    let candidates = graph.find_candidates_by_content(&query_text, CANDIDATE_TOP_K).await?;

    for candidate in candidates {
        if created as usize >= MAX_EDGES_PER_SAVE {
            break;
        }

        let candidate_id = candidate.memory_id.to_string();
        if candidate_id == node_id {
            continue;
        }

        let Some(candidate_node) = graph.node(&candidate_id).await? else {
            continue;
        };

        let shared_category = candidate_node.category == memory.category;
        let concept_overlap = term_overlap_ratio(&own_terms, &candidate_node.concepts);
        let temporal = temporal_proximity(memory.created_at, candidate_node.created_at);
        let affinity = 0.5 * (shared_category as i32 as f32) + 0.3 * concept_overlap + 0.2 * temporal;

        let edge_type = if shared_category {
            Some(GraphEdgeType::SameCategory)
        } else if concept_overlap >= CONCEPT_SIMILAR_THRESHOLD {
            Some(GraphEdgeType::ConceptSimilar)
        } else if affinity >= RELATED_TO_THRESHOLD {
            Some(GraphEdgeType::RelatedTo)
        } else {
            None
        };

        let Some(edge_type) = edge_type else { continue };

        graph.create_edge(node_id, &candidate_id, edge_type, Some(affinity)).await?;
        created += 1;
    }

    Ok(created)
}

fn term_overlap_ratio(own_terms: &HashSet<String>, candidate_concepts: &str) -> f32 {
    let candidate_terms: HashSet<String> = candidate_concepts
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if own_terms.is_empty() || candidate_terms.is_empty() {
        return 0.0;
    }

    let intersection = own_terms.intersection(&candidate_terms).count();
    let union = own_terms.union(&candidate_terms).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Closed-form decay over elapsed time between two memories; 1.0 at zero
/// distance, halving roughly every 24h.
fn temporal_proximity(a: DateTime<Utc>, b: DateTime<Utc>) -> f32 {
    let hours = (a - b).num_hours().unsigned_abs() as f32;
    1.0 / (1.0 + hours / 24.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemoryType;
    use std::collections::HashSet as Set;

    fn concept(title: &str, keywords: &[&str]) -> Concept {
        Concept {
            title: title.to_string(),
            description: "desc".to_string(),
            memory_type: MemoryType::Factual,
            confidence: 0.8,
            mood: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            extracted_concepts: Vec::new(),
        }
    }

    #[test]
    fn test_concept_terms_collects_titles_and_keywords() {
        let concepts = vec![concept("TLS rotation", &["cert", "tls"])];
        let terms = concept_terms(&concepts);
        assert!(terms.contains("tls"));
        assert!(terms.contains("rotation"));
        assert!(terms.contains("cert"));
    }

    #[test]
    fn test_term_overlap_ratio_full_overlap() {
        let own: Set<String> = ["rust", "ownership"].iter().map(|s| s.to_string()).collect();
        assert_eq!(term_overlap_ratio(&own, "rust ownership"), 1.0);
    }

    #[test]
    fn test_term_overlap_ratio_no_overlap_is_zero() {
        let own: Set<String> = ["rust"].iter().map(|s| s.to_string()).collect();
        assert_eq!(term_overlap_ratio(&own, "cooking recipes"), 0.0);
    }

    #[test]
    fn test_temporal_proximity_decreases_with_distance() {
        let now = Utc::now();
        let near = temporal_proximity(now, now - chrono::Duration::hours(1));
        let far = temporal_proximity(now, now - chrono::Duration::hours(240));
        assert!(near > far);
    }
}
