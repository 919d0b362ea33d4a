use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use libsql::{params, Builder, Connection, Row};

use crate::config::GraphConfig;
use crate::db::pool::PoolHandle;
use crate::error::Result;
use crate::models::{GraphCandidate, GraphData, GraphEdge, GraphEdgeType, GraphNode, GraphStatistics, Memory};

struct GraphPool {
    db: libsql::Database,
}

/// Node/edge storage + neighborhood traversal (C3, §4.3), backed by two
/// tables (`graph_nodes`, `graph_edges`) in a `libsql` instance — the same
/// choice this store already makes not to add a dedicated graph database
/// dependency. `GRAPH_URL` selects a local file or remote target.
pub struct GraphStore {
    pool: PoolHandle<GraphPool>,
}

impl GraphStore {
    pub async fn new(config: &GraphConfig) -> Result<Self> {
        let key = format!("graph:{}", config.url);
        let path = config.db.clone().unwrap_or_else(|| config.url.clone());

        let db = if path == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            Builder::new_local(&path).build().await?
        };

        let conn = db.connect()?;
        init_schema(&conn).await?;

        let built = GraphPool { db };
        let pool = PoolHandle::acquire(&key, move || Ok(built))?;
        Ok(Self { pool })
    }

    fn connect(&self) -> Result<Connection> {
        Ok(self.pool.as_ref().db.connect()?)
    }

    /// Creates or updates the node for `memory`. `id` is the string form of
    /// the memory id (possibly the `0` sentinel when there's no relational
    /// backing row).
    pub async fn upsert_node(&self, memory: &Memory, concepts: &str) -> Result<()> {
        let conn = self.connect()?;
        let content_head: String = memory.content.chars().take(GraphNode::CONTENT_HEAD_LEN).collect();

        conn.execute(
            "INSERT INTO graph_nodes (id, category, topic, content_head, concepts, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
                category = excluded.category, topic = excluded.topic, \
                content_head = excluded.content_head, concepts = excluded.concepts",
            params![
                memory.id.to_string(),
                memory.category.clone(),
                memory.topic.clone(),
                content_head,
                concepts.to_string(),
                memory.created_at.to_rfc3339()
            ],
        )
        .await?;

        Ok(())
    }

    /// Idempotent on `(from,to,type)`: repeated calls update `strength` to
    /// the latest value rather than duplicating (§4.3, Property 3).
    pub async fn create_edge(
        &self,
        from_id: &str,
        to_id: &str,
        edge_type: GraphEdgeType,
        strength: Option<f32>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO graph_edges (source, target, edge_type, strength, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(source, target, edge_type) DO UPDATE SET strength = excluded.strength",
            params![
                from_id.to_string(),
                to_id.to_string(),
                edge_type.to_string(),
                strength,
                Utc::now().to_rfc3339()
            ],
        )
        .await?;
        Ok(())
    }

    /// Breadth-first traversal up to `max_depth` (default 2, hard cap 4),
    /// restricted to `edge_types` if given. Capped at 50 nodes.
    pub async fn find_related(
        &self,
        center_id: &str,
        max_depth: u32,
        edge_types: Option<&[GraphEdgeType]>,
    ) -> Result<GraphData> {
        const NODE_CAP: usize = 50;
        let depth = max_depth.min(4);
        let conn = self.connect()?;

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(center_id.to_string());
        let mut frontier = VecDeque::new();
        frontier.push_back((center_id.to_string(), 0u32));

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();

        while let Some((current, level)) = frontier.pop_front() {
            if level >= depth || nodes.len() >= NODE_CAP {
                continue;
            }

            let neighbors = self.one_hop(&conn, &current, edge_types).await?;
            for (edge, neighbor_id) in neighbors {
                let edge_key = (edge.source.clone(), edge.target.clone(), edge.edge_type.to_string());
                if seen_edges.insert(edge_key) {
                    edges.push(edge);
                }

                if !visited.contains(&neighbor_id) {
                    visited.insert(neighbor_id.clone());
                    if let Some(node) = self.get_node(&conn, &neighbor_id).await? {
                        nodes.push(node);
                    }
                    if nodes.len() >= NODE_CAP {
                        break;
                    }
                    frontier.push_back((neighbor_id, level + 1));
                }
            }
            if nodes.len() >= NODE_CAP {
                break;
            }
        }

        Ok(GraphData { nodes, edges })
    }

    async fn one_hop(
        &self,
        conn: &Connection,
        node_id: &str,
        edge_types: Option<&[GraphEdgeType]>,
    ) -> Result<Vec<(GraphEdge, String)>> {
        let mut rows = conn
            .query(
                "SELECT source, target, edge_type, strength FROM graph_edges \
                 WHERE source = ?1 OR target = ?1",
                params![node_id.to_string()],
            )
            .await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let source: String = row.get(0)?;
            let target: String = row.get(1)?;
            let edge_type_str: String = row.get(2)?;
            let strength: Option<f64> = row.get(3)?;

            let Ok(edge_type) = edge_type_str.parse::<GraphEdgeType>() else {
                continue;
            };
            if let Some(allowed) = edge_types {
                if !allowed.contains(&edge_type) {
                    continue;
                }
            }

            let neighbor = if source == node_id { target.clone() } else { source.clone() };
            results.push((
                GraphEdge {
                    source,
                    target,
                    edge_type,
                    strength: strength.map(|s| s as f32),
                },
                neighbor,
            ));
        }
        Ok(results)
    }

    async fn get_node(&self, conn: &Connection, id: &str) -> Result<Option<GraphNode>> {
        let mut rows = conn
            .query(
                "SELECT id, category, topic, content_head, concepts, created_at FROM graph_nodes WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Public lookup by node id, used by relationship discovery (§4.7.2) to
    /// read a candidate's category/concepts without a relational round-trip.
    pub async fn node(&self, id: &str) -> Result<Option<GraphNode>> {
        let conn = self.connect()?;
        self.get_node(&conn, id).await
    }

    /// Content-similarity search. Falls back to a substring match over
    /// `topic`/`content_head`/`concepts` (§4.3: "implementation-specific;
    /// may fall back to exact/substring match").
    pub async fn find_candidates_by_content(&self, text: &str, top_k: u32) -> Result<Vec<GraphCandidate>> {
        let conn = self.connect()?;
        let terms: Vec<&str> = text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = conn
            .query("SELECT id, topic, content_head, concepts FROM graph_nodes", ())
            .await?;

        let mut scored: Vec<(i64, f32)> = Vec::new();
        while let Some(row) = rows.next().await? {
            let id_str: String = row.get(0)?;
            let topic: String = row.get(1)?;
            let content_head: String = row.get(2)?;
            let concepts: String = row.get(3)?;
            let Ok(id) = id_str.parse::<i64>() else { continue };

            let haystack = format!("{topic} {content_head} {concepts}").to_lowercase();
            let hits = terms.iter().filter(|t| haystack.contains(&t.to_lowercase())).count();
            if hits > 0 {
                scored.push((id, hits as f32 / terms.len() as f32));
            }
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(b.0.cmp(&a.0)));
        scored.truncate(top_k as usize);

        Ok(scored
            .into_iter()
            .map(|(memory_id, score)| GraphCandidate { memory_id, score })
            .collect())
    }

    pub async fn statistics(&self) -> Result<GraphStatistics> {
        let conn = self.connect()?;

        let mut total_nodes_rows = conn.query("SELECT COUNT(*) FROM graph_nodes", ()).await?;
        let total_nodes: i64 = match total_nodes_rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let mut total_edges_rows = conn.query("SELECT COUNT(*) FROM graph_edges", ()).await?;
        let total_edges: i64 = match total_edges_rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let mut edge_type_counts: HashMap<String, i64> = HashMap::new();
        let mut type_rows = conn
            .query("SELECT edge_type, COUNT(*) FROM graph_edges GROUP BY edge_type", ())
            .await?;
        while let Some(row) = type_rows.next().await? {
            let edge_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            edge_type_counts.insert(edge_type, count);
        }

        Ok(GraphStatistics {
            total_nodes,
            total_edges,
            edge_type_counts,
        })
    }

    pub async fn delete_node(&self, id: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM graph_edges WHERE source = ?1 OR target = ?1",
            params![id.to_string()],
        )
        .await?;
        conn.execute("DELETE FROM graph_nodes WHERE id = ?1", params![id.to_string()]).await?;
        Ok(())
    }

    pub async fn health(&self) -> bool {
        let Ok(conn) = self.connect() else { return false };
        conn.query("SELECT COUNT(*) FROM graph_nodes", ()).await.is_ok()
    }
}

fn row_to_node(row: &Row) -> Result<GraphNode> {
    let created_at_str: String = row.get(5)?;
    Ok(GraphNode {
        id: row.get(0)?,
        category: row.get(1)?,
        topic: row.get(2)?,
        content_head: row.get(3)?,
        concepts: row.get(4)?,
        created_at: chrono::DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            topic TEXT NOT NULL,
            content_head TEXT NOT NULL,
            concepts TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS graph_edges (
            source TEXT NOT NULL,
            target TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            strength REAL,
            created_at TEXT NOT NULL,
            UNIQUE(source, target, edge_type)
        );

        CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges(source);
        CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges(target);
        "#,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_store() -> GraphStore {
        GraphStore::new(&GraphConfig {
            url: ":memory:".to_string(),
            user: None,
            password: None,
            db: None,
        })
        .await
        .unwrap()
    }

    fn test_memory(id: i64, category: &str, topic: &str) -> Memory {
        Memory {
            id,
            created_at: Utc::now(),
            date: Utc::now().date_naive(),
            category: category.to_string(),
            topic: topic.to_string(),
            content: "some content for the node".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_edge_is_idempotent() {
        let store = test_store().await;
        store.upsert_node(&test_memory(1, "debug", "a"), "").await.unwrap();
        store.upsert_node(&test_memory(2, "debug", "b"), "").await.unwrap();

        store.create_edge("1", "2", GraphEdgeType::RelatedTo, Some(0.4)).await.unwrap();
        store.create_edge("1", "2", GraphEdgeType::RelatedTo, Some(0.9)).await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_edges, 1);

        let related = store.find_related("1", 2, None).await.unwrap();
        assert_eq!(related.edges[0].strength, Some(0.9));
    }

    #[tokio::test]
    async fn test_find_related_respects_depth_cap() {
        let store = test_store().await;
        for i in 1..=4 {
            store.upsert_node(&test_memory(i, "debug", "n"), "").await.unwrap();
        }
        store.create_edge("1", "2", GraphEdgeType::RelatedTo, None).await.unwrap();
        store.create_edge("2", "3", GraphEdgeType::RelatedTo, None).await.unwrap();
        store.create_edge("3", "4", GraphEdgeType::RelatedTo, None).await.unwrap();

        let depth1 = store.find_related("1", 1, None).await.unwrap();
        assert_eq!(depth1.nodes.len(), 1);

        let depth2 = store.find_related("1", 2, None).await.unwrap();
        assert_eq!(depth2.nodes.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_node_removes_incident_edges() {
        let store = test_store().await;
        store.upsert_node(&test_memory(1, "debug", "a"), "").await.unwrap();
        store.upsert_node(&test_memory(2, "debug", "b"), "").await.unwrap();
        store.create_edge("1", "2", GraphEdgeType::RelatedTo, None).await.unwrap();

        store.delete_node("1").await.unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_nodes, 1);
        assert_eq!(stats.total_edges, 0);
    }
}
