use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Edge labels between graph nodes (§3). Lowercase on the wire, matching the
/// convention the rest of this system's serialized enums follow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphEdgeType {
    RelatedTo,
    SameCategory,
    SameTopic,
    ConceptSimilar,
    TemporalAdjacent,
}

impl std::fmt::Display for GraphEdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RelatedTo => "RELATED_TO",
            Self::SameCategory => "SAME_CATEGORY",
            Self::SameTopic => "SAME_TOPIC",
            Self::ConceptSimilar => "CONCEPT_SIMILAR",
            Self::TemporalAdjacent => "TEMPORAL_ADJACENT",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for GraphEdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RELATED_TO" => Ok(Self::RelatedTo),
            "SAME_CATEGORY" => Ok(Self::SameCategory),
            "SAME_TOPIC" => Ok(Self::SameTopic),
            "CONCEPT_SIMILAR" => Ok(Self::ConceptSimilar),
            "TEMPORAL_ADJACENT" => Ok(Self::TemporalAdjacent),
            other => Err(format!("Unknown graph edge type: {other}")),
        }
    }
}

/// One node per saved memory (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub category: String,
    pub topic: String,
    pub content_head: String,
    pub concepts: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl GraphNode {
    /// Length of the content prefix kept in `content_head` for graph viewers.
    pub const CONTENT_HEAD_LEN: usize = 160;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub edge_type: GraphEdgeType,
    pub strength: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: i64,
    pub total_edges: i64,
    pub edge_type_counts: HashMap<String, i64>,
}

/// One hit from `find_candidates_by_content` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphCandidate {
    pub memory_id: i64,
    pub score: f32,
}

/// An explicit edge requested by the caller via `force_relationships`
/// (§4.7.2). Created exactly as provided, augmenting (never replacing)
/// whatever relationship discovery finds on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct ForcedRelationship {
    pub target_memory_id: i64,
    pub edge_type: GraphEdgeType,
    pub strength: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_type_display_is_screaming_snake_case() {
        assert_eq!(GraphEdgeType::SameCategory.to_string(), "SAME_CATEGORY");
        assert_eq!(GraphEdgeType::ConceptSimilar.to_string(), "CONCEPT_SIMILAR");
    }

    #[test]
    fn test_edge_type_round_trip() {
        for t in [
            GraphEdgeType::RelatedTo,
            GraphEdgeType::SameCategory,
            GraphEdgeType::SameTopic,
            GraphEdgeType::ConceptSimilar,
            GraphEdgeType::TemporalAdjacent,
        ] {
            assert_eq!(t.to_string().parse::<GraphEdgeType>().unwrap(), t);
        }
    }

    #[test]
    fn test_edge_type_serde_matches_display() {
        let json = serde_json::to_string(&GraphEdgeType::RelatedTo).unwrap();
        assert_eq!(json, "\"RELATED_TO\"");
    }
}
