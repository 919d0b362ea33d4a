use chrono::Utc;
use libsql::{params, Builder, Connection, Row};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::VectorConfig;
use crate::db::pool::PoolHandle;
use crate::error::{PipelineError, Result};
use crate::models::{Concept, Memory, VectorMatch, VectorRecord};

struct VectorPool {
    db: libsql::Database,
}

/// Concept storage + similarity search (C2, §4.2), backed by `libsql`'s
/// native vector extension (`F32_BLOB(n)`, `vector32()`, `vector_distance_cos()`,
/// `libsql_vector_idx`) — the same mechanism this store already uses for its
/// memory similarity search.
pub struct VectorStore {
    pool: PoolHandle<VectorPool>,
    collection: String,
    dimensions: usize,
}

fn sanitize_identifier(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().next().unwrap().is_ascii_digit() {
        format!("t_{cleaned}")
    } else {
        cleaned
    }
}

impl VectorStore {
    pub async fn new(config: &VectorConfig, dimensions: usize) -> Result<Self> {
        let key = format!("vector:{}", config.url);
        let db = if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            Builder::new_local(&config.url).build().await?
        };

        let built = VectorPool { db };
        let pool = PoolHandle::acquire(&key, move || Ok(built))?;

        let store = Self {
            pool,
            collection: sanitize_identifier(&config.collection),
            dimensions,
        };
        store.initialize(&config.collection).await?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Ok(self.pool.as_ref().db.connect()?)
    }

    /// Ensures the named collection (table) exists. Idempotent.
    pub async fn initialize(&self, _collection: &str) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                doc_id TEXT PRIMARY KEY, \
                document TEXT NOT NULL, \
                embedding F32_BLOB({}), \
                metadata TEXT NOT NULL, \
                memory_id INTEGER NOT NULL \
             )",
            self.collection, self.dimensions
        );
        conn.execute_batch(&sql).await?;

        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_vector ON {0} (libsql_vector_idx(embedding))",
            self.collection
        );
        // Vector indexing is an optimization; tolerate engines/builds that
        // don't support it rather than failing initialization.
        if let Err(error) = conn.execute_batch(&index_sql).await {
            tracing::debug!(%error, "libsql_vector_idx unavailable, falling back to full scan");
        }

        Ok(())
    }

    /// Computes embeddings for each concept with a non-empty description and
    /// writes them. Empty descriptions are dropped silently and counted as
    /// skipped, not errors (§4.2, Property 4).
    pub async fn store_concepts(
        &self,
        memory: &Memory,
        concepts: &[Concept],
        embedder: &crate::embeddings::EmbeddingProvider,
    ) -> Result<(usize, Vec<String>)> {
        let conn = self.connect()?;
        let mut stored = 0;
        let mut errors = Vec::new();
        let now = Utc::now();

        for (i, concept) in concepts.iter().enumerate() {
            if !concept.has_nonempty_description() {
                continue;
            }

            let embedding = match embedder.embed_single(&concept.description).await {
                Ok(e) => e,
                Err(e) => {
                    errors.push(format!("embedding failed for concept {i}: {e}"));
                    continue;
                }
            };

            let doc_id = VectorRecord::doc_id_for(memory.id, i, now.timestamp());
            let mut metadata: HashMap<String, Value> = HashMap::new();
            metadata.insert("title".to_string(), Value::String(concept.title.clone()));
            metadata.insert(
                "memory_type".to_string(),
                Value::String(concept.memory_type.to_string()),
            );
            metadata.insert("confidence".to_string(), serde_json::json!(concept.confidence));
            if let Some(mood) = &concept.mood {
                metadata.insert("mood".to_string(), Value::String(mood.clone()));
            }
            metadata.insert(
                "keywords".to_string(),
                serde_json::json!(concept.keywords.iter().collect::<Vec<_>>()),
            );
            metadata.insert(
                "extracted_concepts".to_string(),
                serde_json::json!(concept.extracted_concepts),
            );
            metadata.insert("source_memory_id".to_string(), serde_json::json!(memory.id));
            metadata.insert("source_category".to_string(), Value::String(memory.category.clone()));
            metadata.insert("source_topic".to_string(), Value::String(memory.topic.clone()));
            metadata.insert("source_date".to_string(), Value::String(memory.date.to_string()));
            metadata.insert("created_at".to_string(), Value::String(now.to_rfc3339()));
            metadata.insert("source".to_string(), Value::String("semantic_analysis".to_string()));

            let metadata_json = serde_json::to_string(&metadata)?;
            let embedding_json = serde_json::to_string(&embedding)?;

            let sql = format!(
                "INSERT INTO {} (doc_id, document, embedding, metadata, memory_id) \
                 VALUES (?1, ?2, vector32(?3), ?4, ?5)",
                self.collection
            );

            if let Err(e) = conn
                .execute(
                    &sql,
                    params![doc_id, concept.description.clone(), embedding_json, metadata_json, memory.id],
                )
                .await
            {
                errors.push(format!("store failed for concept {i}: {e}"));
                continue;
            }

            stored += 1;
        }

        Ok((stored, errors))
    }

    /// Top-k by cosine similarity; ties broken by larger `memory_id` (newer
    /// first). Post-filters by category when `category_filter` is given.
    pub async fn search_similar(
        &self,
        embedder: &crate::embeddings::EmbeddingProvider,
        query: &str,
        top_k: u32,
        category_filter: Option<&str>,
    ) -> Result<Vec<VectorMatch>> {
        let embedding = embedder.embed_single(query).await?;
        let embedding_json = serde_json::to_string(&embedding)?;
        let conn = self.connect()?;

        let sql = format!(
            "SELECT doc_id, memory_id, metadata, \
                1 - vector_distance_cos(embedding, vector32(?1)) as score \
             FROM {} \
             ORDER BY score DESC, memory_id DESC \
             LIMIT ?2",
            self.collection
        );

        let fetch_limit = if category_filter.is_some() { top_k.saturating_mul(4).max(top_k) } else { top_k };
        let mut rows = conn.query(&sql, params![embedding_json, fetch_limit]).await?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let hit = row_to_match(&row)?;
            if let Some(category) = category_filter {
                let matches_category = hit
                    .metadata
                    .get("source_category")
                    .and_then(Value::as_str)
                    .map(|c| c == category)
                    .unwrap_or(false);
                if !matches_category {
                    continue;
                }
            }
            results.push(hit);
            if results.len() as u32 >= top_k {
                break;
            }
        }

        Ok(results)
    }

    /// Best-effort removal of all vector records referencing this memory.
    pub async fn delete_for_memory(&self, memory_id: i64) -> Result<()> {
        let conn = self.connect()?;
        let sql = format!("DELETE FROM {} WHERE memory_id = ?1", self.collection);
        if let Err(error) = conn.execute(&sql, params![memory_id]).await {
            tracing::warn!(%error, memory_id, "best-effort vector delete failed");
        }
        Ok(())
    }

    pub async fn health(&self) -> bool {
        let Ok(conn) = self.connect() else { return false };
        let sql = format!("SELECT COUNT(*) FROM {}", self.collection);
        conn.query(&sql, ()).await.is_ok()
    }
}

fn row_to_match(row: &Row) -> Result<VectorMatch> {
    let memory_id: i64 = row.get(1)?;
    let metadata_json: String = row.get(2)?;
    let score: f64 = row.get(3)?;

    let metadata: HashMap<String, Value> = serde_json::from_str(&metadata_json)
        .map_err(|e| PipelineError::Data(format!("corrupt vector metadata: {e}")))?;

    Ok(VectorMatch {
        memory_id,
        // Cosine distance ranges [0,2], so `1 - distance` ranges [-1,1];
        // clamp to the §4.2 contract of score ∈ [0,1].
        score: (score as f32).max(0.0),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier_replaces_hyphens() {
        assert_eq!(sanitize_identifier("memory-main"), "memory_main");
    }

    #[test]
    fn test_sanitize_identifier_prefixes_leading_digit() {
        assert_eq!(sanitize_identifier("1collection"), "t_1collection");
    }
}
