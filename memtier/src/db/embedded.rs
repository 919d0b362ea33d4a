use libsql::{params, Builder, Connection, Row};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use uuid::Uuid;

use crate::config::RelationalConfig;
use crate::db::pool::PoolHandle;
use crate::db::traits::RelationalStore;
use crate::error::{PipelineError, Result};
use crate::models::{
    AnalysisJob, AnalysisResult, HealthStatus, JobStatus, Memory, MemoryUpdate, RelationalStats,
    CATEGORY_SHORT_MEMORY,
};

mod schema;

struct EmbeddedPool {
    db: libsql::Database,
    busy_timeout_ms: u64,
}

/// Local file-backed relational store (§4.1), using `libsql`'s local mode —
/// the same engine and pragma configuration this store already relies on for
/// its sole relational backend.
pub struct EmbeddedBackend {
    pool: PoolHandle<EmbeddedPool>,
    short_memory_capacity: u32,
}

impl EmbeddedBackend {
    pub async fn new(config: &RelationalConfig, short_memory_capacity: u32) -> Result<Self> {
        Self::new_async(&config.embedded_db_path, short_memory_capacity).await
    }

    /// Split from `new` because opening a libsql database is async while
    /// `PoolHandle::acquire`'s build closure is synchronous: the database is
    /// built first, then handed to the registry already-constructed.
    async fn new_async(path: &str, short_memory_capacity: u32) -> Result<Self> {
        let key = format!("embedded:{path}");
        let busy_timeout_ms: u64 = std::env::var("DATABASE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        // Build once, outside the registry, then hand ownership to the
        // registry via a synchronous closure (the db handle itself is
        // already fully constructed at this point).
        let db = if path == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            Builder::new_local(path).build().await?
        };

        let conn = db.connect()?;
        configure_pragmas(&conn, busy_timeout_ms).await;
        schema::init_schema(&conn).await?;

        let built = EmbeddedPool { db, busy_timeout_ms };
        let pool = PoolHandle::acquire(&key, move || Ok(built))?;

        Ok(Self { pool, short_memory_capacity })
    }

    fn connect(&self) -> Result<Connection> {
        Ok(self.pool.as_ref().db.connect()?)
    }
}

async fn configure_pragmas(conn: &Connection, busy_timeout_ms: u64) {
    let journal_mode = std::env::var("DATABASE_JOURNAL_MODE").unwrap_or_else(|_| "WAL".to_string());
    let synchronous = std::env::var("DATABASE_SYNCHRONOUS").unwrap_or_else(|_| "NORMAL".to_string());

    for sql in [
        format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
        format!("PRAGMA journal_mode = {}", normalize_journal_mode(&journal_mode)),
        format!("PRAGMA synchronous = {}", normalize_synchronous(&synchronous)),
    ] {
        if let Err(error) = conn.execute_batch(&sql).await {
            tracing::warn!(%sql, %error, "Failed to apply SQLite pragma");
        }
    }
}

fn normalize_journal_mode(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "DELETE" => "DELETE",
        "TRUNCATE" => "TRUNCATE",
        "PERSIST" => "PERSIST",
        "MEMORY" => "MEMORY",
        "OFF" => "OFF",
        _ => "WAL",
    }
}

fn normalize_synchronous(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "OFF" => "OFF",
        "FULL" => "FULL",
        "EXTRA" => "EXTRA",
        _ => "NORMAL",
    }
}

fn row_to_memory(row: &Row) -> Result<Memory> {
    let id: i64 = row.get(0)?;
    let date_str: String = row.get(1)?;
    let category: String = row.get(2)?;
    let topic: String = row.get(3)?;
    let content: String = row.get(4)?;
    let created_at_str: String = row.get(5)?;

    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| PipelineError::Data(format!("corrupt date in memories row {id}: {e}")))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::Data(format!("corrupt created_at in memories row {id}: {e}")))?;

    Ok(Memory {
        id,
        created_at,
        date,
        category,
        topic,
        content,
    })
}

const SELECT_COLUMNS: &str = "id, date, category, topic, content, created_at";

#[async_trait]
impl RelationalStore for EmbeddedBackend {
    async fn save_memory(&self, category: &str, topic: &str, content: &str) -> Result<Memory> {
        let conn = self.connect()?;
        let now = Utc::now();
        let date = now.date_naive();

        conn.execute(
            "INSERT INTO memories (date, category, topic, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                date.to_string(),
                category.to_string(),
                topic.to_string(),
                content.to_string(),
                now.to_rfc3339()
            ],
        )
        .await?;

        let id = conn.last_insert_rowid();
        Ok(Memory {
            id,
            created_at: now,
            date,
            category: category.to_string(),
            topic: topic.to_string(),
            content: content.to_string(),
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Memory>> {
        if id == crate::models::NO_RELATIONAL_ROW {
            return Ok(None);
        }

        let conn = self.connect()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM memories WHERE id = ?1");
        let mut rows = conn.query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_memory(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: i64, update: &MemoryUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(self.get_by_id(id).await?.is_some());
        }

        let conn = self.connect()?;
        let mut sets = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();
        let mut idx = 1;

        if let Some(topic) = &update.topic {
            sets.push(format!("topic = ?{idx}"));
            values.push(libsql::Value::from(topic.clone()));
            idx += 1;
        }
        if let Some(content) = &update.content {
            sets.push(format!("content = ?{idx}"));
            values.push(libsql::Value::from(content.clone()));
            idx += 1;
        }
        if let Some(category) = &update.category {
            sets.push(format!("category = ?{idx}"));
            values.push(libsql::Value::from(category.clone()));
            idx += 1;
        }

        values.push(libsql::Value::from(id));
        let sql = format!("UPDATE memories SET {} WHERE id = ?{idx}", sets.join(", "));

        let affected = conn.execute(&sql, libsql::params_from_iter(values)).await?;
        Ok(affected > 0)
    }

    async fn move_category(&self, id: i64, new_category: &str) -> Result<bool> {
        if new_category.trim().is_empty() {
            return Ok(false);
        }
        self.update(
            id,
            &MemoryUpdate {
                category: Some(new_category.to_string()),
                ..Default::default()
            },
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.connect()?;
        let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id]).await?;
        Ok(affected > 0)
    }

    async fn search_basic(&self, query: &str, categories: &[String]) -> Result<Vec<Memory>> {
        let conn = self.connect()?;
        let like = format!("%{}%", query.to_lowercase());

        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM memories WHERE (LOWER(topic) LIKE ?1 OR LOWER(content) LIKE ?1)"
        );
        let mut values: Vec<libsql::Value> = vec![libsql::Value::from(like)];

        if !categories.is_empty() {
            let placeholders: Vec<String> = (0..categories.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            sql.push_str(&format!(" AND category IN ({})", placeholders.join(", ")));
            for c in categories {
                values.push(libsql::Value::from(c.clone()));
            }
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_memory(&row)?);
        }
        Ok(results)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Memory>> {
        let conn = self.connect()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM memories ORDER BY created_at DESC LIMIT ?1");
        let mut rows = conn.query(&sql, params![limit]).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_memory(&row)?);
        }
        Ok(results)
    }

    async fn by_category(&self, category: &str, limit: u32) -> Result<Vec<Memory>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM memories WHERE category = ?1 ORDER BY created_at DESC LIMIT ?2"
        );
        let mut rows = conn.query(&sql, params![category.to_string(), limit]).await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_memory(&row)?);
        }
        Ok(results)
    }

    async fn list_categories(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT category, COUNT(*) FROM memories GROUP BY category ORDER BY category",
                (),
            )
            .await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            let category: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            results.push((category, count));
        }
        Ok(results)
    }

    async fn add_to_short_memory(&self, memory: &Memory) -> Result<()> {
        self.save_memory(CATEGORY_SHORT_MEMORY, &memory.topic, &memory.content).await?;

        // Evict oldest rows beyond the configured cap (§4.8, Property 2).
        let current = self.by_category(CATEGORY_SHORT_MEMORY, u32::MAX).await?;
        if current.len() as u32 > self.short_memory_capacity {
            let overflow = current.len() as u32 - self.short_memory_capacity;
            let mut oldest = current;
            oldest.sort_by_key(|m| m.created_at);
            for m in oldest.into_iter().take(overflow as usize) {
                self.delete(m.id).await?;
            }
        }
        Ok(())
    }

    async fn list_short_memory(&self, limit: u32) -> Result<Vec<Memory>> {
        self.by_category(CATEGORY_SHORT_MEMORY, limit).await
    }

    async fn stats(&self) -> Result<RelationalStats> {
        let conn = self.connect()?;
        let mut total_rows = conn.query("SELECT COUNT(*) FROM memories", ()).await?;
        let total: i64 = match total_rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        let by_category = self.list_categories().await?.into_iter().collect();

        Ok(RelationalStats {
            total,
            by_category,
            db_type: "embedded".to_string(),
        })
    }

    async fn health(&self) -> Result<HealthStatus> {
        match self.connect().and_then(|_| Ok::<_, PipelineError>(())) {
            Ok(()) => Ok(HealthStatus {
                ok: true,
                detail: "embedded store reachable".to_string(),
            }),
            Err(e) => Ok(HealthStatus {
                ok: false,
                detail: e.to_string(),
            }),
        }
    }

    async fn create_job(&self, job: &AnalysisJob) -> Result<()> {
        let conn = self.connect()?;
        let memory_ids_json = serde_json::to_string(&job.memory_ids)?;
        conn.execute(
            "INSERT INTO analysis_jobs \
                (id, status, job_type, memory_ids, progress_current, progress_total, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                job.id.to_string(),
                job.status.to_string(),
                job.job_type.clone(),
                memory_ids_json,
                job.progress_current,
                job.progress_total,
                job.created_at.to_rfc3339()
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, status, job_type, memory_ids, progress_current, progress_total, \
                        created_at, started_at, completed_at, error_message \
                 FROM analysis_jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_job(&row)?)),
            None => Ok(None),
        }
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE analysis_jobs SET status = ?1, started_at = ?2 WHERE id = ?3",
            params![JobStatus::Running.to_string(), Utc::now().to_rfc3339(), id.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn update_job_progress(&self, id: Uuid, progress_current: u32) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE analysis_jobs SET progress_current = ?1 WHERE id = ?2",
            params![progress_current, id.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn mark_job_completed(&self, id: Uuid) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE analysis_jobs SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![JobStatus::Completed.to_string(), Utc::now().to_rfc3339(), id.to_string()],
        )
        .await?;
        Ok(())
    }

    async fn mark_job_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE analysis_jobs SET status = ?1, completed_at = ?2, error_message = ?3 WHERE id = ?4",
            params![
                JobStatus::Failed.to_string(),
                Utc::now().to_rfc3339(),
                error_message.to_string(),
                id.to_string()
            ],
        )
        .await?;
        Ok(())
    }

    async fn append_analysis_result(&self, result: &AnalysisResult) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO analysis_results \
                (job_id, memory_id, memory_type, confidence, extracted_concepts, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.job_id.to_string(),
                result.memory_id,
                result.memory_type.clone(),
                result.confidence,
                result.concepts_json.clone(),
                result.metadata_json.clone(),
                Utc::now().to_rfc3339()
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_analysis_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT job_id, memory_id, memory_type, confidence, extracted_concepts, metadata \
                 FROM analysis_results WHERE job_id = ?1 ORDER BY id ASC",
                params![job_id.to_string()],
            )
            .await?;
        let mut results = Vec::new();
        while let Some(row) = rows.next().await? {
            results.push(row_to_result(&row)?);
        }
        Ok(results)
    }
}

fn row_to_job(row: &Row) -> Result<AnalysisJob> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(1)?;
    let job_type: String = row.get(2)?;
    let memory_ids_json: String = row.get(3)?;
    let progress_current: i64 = row.get(4)?;
    let progress_total: i64 = row.get(5)?;
    let created_at_str: String = row.get(6)?;
    let started_at_str: Option<String> = row.get(7)?;
    let completed_at_str: Option<String> = row.get(8)?;
    let error_message: Option<String> = row.get(9)?;

    Ok(AnalysisJob {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| PipelineError::Data(format!("corrupt job id: {e}")))?,
        status: parse_job_status(&status_str)?,
        job_type,
        memory_ids: serde_json::from_str(&memory_ids_json)?,
        progress_current: progress_current as u32,
        progress_total: progress_total as u32,
        created_at: parse_rfc3339(&created_at_str)?,
        started_at: started_at_str.map(|s| parse_rfc3339(&s)).transpose()?,
        completed_at: completed_at_str.map(|s| parse_rfc3339(&s)).transpose()?,
        error_message,
    })
}

fn row_to_result(row: &Row) -> Result<AnalysisResult> {
    let job_id_str: String = row.get(0)?;
    Ok(AnalysisResult {
        job_id: Uuid::parse_str(&job_id_str)
            .map_err(|e| PipelineError::Data(format!("corrupt job id: {e}")))?,
        memory_id: row.get(1)?,
        memory_type: row.get(2)?,
        confidence: row.get::<f64>(3)? as f32,
        concepts_json: row.get(4)?,
        metadata_json: row.get(5)?,
    })
}

fn parse_job_status(s: &str) -> Result<JobStatus> {
    match s {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        other => Err(PipelineError::Data(format!("unknown job status: {other}"))),
    }
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PipelineError::Data(format!("corrupt timestamp {s}: {e}")))
}
