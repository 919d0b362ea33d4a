use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
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

/// Postgres-backed relational store (§4.1), selected by
/// `RELATIONAL_BACKEND=networked`. Adopts `sqlx`'s async Postgres driver and
/// pool since the distilled spec's env vars (`DB_HOST`/`DB_PORT`/`DB_USER`/
/// `DB_PASSWORD`) are recognizably Postgres-shaped; see DESIGN.md.
pub struct NetworkedBackend {
    pool: PoolHandle<PgPool>,
    short_memory_capacity: u32,
}

impl NetworkedBackend {
    pub async fn new(config: &RelationalConfig, short_memory_capacity: u32) -> Result<Self> {
        let key = format!(
            "networked:{}:{}:{}:{}",
            config.db_host, config.db_port, config.db_name, config.db_user
        );

        let conn_str = format!(
            "postgres://{}:{}@{}:{}/{}",
            config.db_user, config.db_password, config.db_host, config.db_port, config.db_name
        );

        let max_conn = config.db_max_conn;
        let idle_ms = config.db_idle_ms;
        let conn_timeout_ms = config.db_conn_timeout_ms;

        // `PoolHandle::acquire`'s build closure is synchronous; the pool
        // itself must be built with `block_on` avoided by constructing it
        // ahead of time, same split as the embedded backend.
        let pg_pool = PgPoolOptions::new()
            .max_connections(max_conn)
            .idle_timeout(Duration::from_millis(idle_ms))
            .acquire_timeout(Duration::from_millis(conn_timeout_ms))
            .connect(&conn_str)
            .await
            .map_err(|e| PipelineError::BackendUnavailable(format!("postgres connect: {e}")))?;

        schema::init_schema(&pg_pool).await?;

        let pool = PoolHandle::acquire(&key, move || Ok(pg_pool))?;
        Ok(Self { pool, short_memory_capacity })
    }

    fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }
}

fn row_to_memory(row: &PgRow) -> Result<Memory> {
    Ok(Memory {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        date: row.try_get("date")?,
        category: row.try_get("category")?,
        topic: row.try_get("topic")?,
        content: row.try_get("content")?,
    })
}

const SELECT_COLUMNS: &str = "id, date, category, topic, content, created_at";

#[async_trait]
impl RelationalStore for NetworkedBackend {
    async fn save_memory(&self, category: &str, topic: &str, content: &str) -> Result<Memory> {
        let now: DateTime<Utc> = Utc::now();
        let date = now.date_naive();

        let row = sqlx::query(&format!(
            "INSERT INTO memories (date, category, topic, content, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SELECT_COLUMNS}"
        ))
        .bind(date)
        .bind(category)
        .bind(topic)
        .bind(content)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        row_to_memory(&row)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Memory>> {
        if id == crate::models::NO_RELATIONAL_ROW {
            return Ok(None);
        }

        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM memories WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        row.as_ref().map(row_to_memory).transpose()
    }

    async fn update(&self, id: i64, update: &MemoryUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(self.get_by_id(id).await?.is_some());
        }

        let mut sets = Vec::new();
        let mut idx = 1;
        if update.topic.is_some() {
            sets.push(format!("topic = ${idx}"));
            idx += 1;
        }
        if update.content.is_some() {
            sets.push(format!("content = ${idx}"));
            idx += 1;
        }
        if update.category.is_some() {
            sets.push(format!("category = ${idx}"));
            idx += 1;
        }
        let sql = format!("UPDATE memories SET {} WHERE id = ${idx}", sets.join(", "));

        let mut query = sqlx::query(&sql);
        if let Some(topic) = &update.topic {
            query = query.bind(topic);
        }
        if let Some(content) = &update.content {
            query = query.bind(content);
        }
        if let Some(category) = &update.category {
            query = query.bind(category);
        }
        query = query.bind(id);

        let result = query
            .execute(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(result.rows_affected() > 0)
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
        let result = sqlx::query("DELETE FROM memories WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn search_basic(&self, query: &str, categories: &[String]) -> Result<Vec<Memory>> {
        let like = format!("%{}%", query.to_lowercase());

        let rows = if categories.is_empty() {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM memories \
                 WHERE (LOWER(topic) LIKE $1 OR LOWER(content) LIKE $1) \
                 ORDER BY created_at DESC"
            ))
            .bind(&like)
            .fetch_all(self.pool())
            .await
        } else {
            sqlx::query(&format!(
                "SELECT {SELECT_COLUMNS} FROM memories \
                 WHERE (LOWER(topic) LIKE $1 OR LOWER(content) LIKE $1) AND category = ANY($2) \
                 ORDER BY created_at DESC"
            ))
            .bind(&like)
            .bind(categories)
            .fetch_all(self.pool())
            .await
        }
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM memories ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn by_category(&self, category: &str, limit: u32) -> Result<Vec<Memory>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM memories WHERE category = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(category)
        .bind(limit as i64)
        .fetch_all(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        rows.iter().map(row_to_memory).collect()
    }

    async fn list_categories(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT category, COUNT(*) as count FROM memories GROUP BY category ORDER BY category",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        rows.iter()
            .map(|r| Ok((r.try_get("category")?, r.try_get("count")?)))
            .collect()
    }

    async fn add_to_short_memory(&self, memory: &Memory) -> Result<()> {
        self.save_memory(CATEGORY_SHORT_MEMORY, &memory.topic, &memory.content).await?;

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
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories")
            .fetch_one(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        let by_category = self.list_categories().await?.into_iter().collect();

        Ok(RelationalStats {
            total,
            by_category,
            db_type: "networked".to_string(),
        })
    }

    async fn health(&self) -> Result<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(self.pool()).await {
            Ok(_) => Ok(HealthStatus {
                ok: true,
                detail: "networked store reachable".to_string(),
            }),
            Err(e) => Ok(HealthStatus {
                ok: false,
                detail: e.to_string(),
            }),
        }
    }

    async fn create_job(&self, job: &AnalysisJob) -> Result<()> {
        let memory_ids_json = serde_json::to_string(&job.memory_ids)?;
        sqlx::query(
            "INSERT INTO analysis_jobs \
                (id, status, job_type, memory_ids, progress_current, progress_total, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(job.id.to_string())
        .bind(job.status.to_string())
        .bind(&job.job_type)
        .bind(memory_ids_json)
        .bind(job.progress_current as i32)
        .bind(job.progress_total as i32)
        .bind(job.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        let row = sqlx::query(
            "SELECT id, status, job_type, memory_ids, progress_current, progress_total, \
                    created_at, started_at, completed_at, error_message \
             FROM analysis_jobs WHERE id = $1",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn mark_job_running(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE analysis_jobs SET status = $1, started_at = $2 WHERE id = $3")
            .bind(JobStatus::Running.to_string())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn update_job_progress(&self, id: Uuid, progress_current: u32) -> Result<()> {
        sqlx::query("UPDATE analysis_jobs SET progress_current = $1 WHERE id = $2")
            .bind(progress_current as i32)
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn mark_job_completed(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE analysis_jobs SET status = $1, completed_at = $2 WHERE id = $3")
            .bind(JobStatus::Completed.to_string())
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(self.pool())
            .await
            .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn mark_job_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE analysis_jobs SET status = $1, completed_at = $2, error_message = $3 WHERE id = $4",
        )
        .bind(JobStatus::Failed.to_string())
        .bind(Utc::now())
        .bind(error_message)
        .bind(id.to_string())
        .execute(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn append_analysis_result(&self, result: &AnalysisResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO analysis_results \
                (job_id, memory_id, memory_type, confidence, extracted_concepts, metadata, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(result.job_id.to_string())
        .bind(result.memory_id)
        .bind(&result.memory_type)
        .bind(result.confidence)
        .bind(&result.concepts_json)
        .bind(&result.metadata_json)
        .bind(Utc::now())
        .execute(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn list_analysis_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>> {
        let rows = sqlx::query(
            "SELECT job_id, memory_id, memory_type, confidence, extracted_concepts, metadata \
             FROM analysis_results WHERE job_id = $1 ORDER BY id ASC",
        )
        .bind(job_id.to_string())
        .fetch_all(self.pool())
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

        rows.iter().map(row_to_result).collect()
    }
}

fn row_to_job(row: &PgRow) -> Result<AnalysisJob> {
    let id_str: String = row.try_get("id")?;
    let status_str: String = row.try_get("status")?;
    let memory_ids_json: String = row.try_get("memory_ids")?;
    let progress_current: i32 = row.try_get("progress_current")?;
    let progress_total: i32 = row.try_get("progress_total")?;

    Ok(AnalysisJob {
        id: Uuid::parse_str(&id_str).map_err(|e| PipelineError::Data(format!("corrupt job id: {e}")))?,
        status: parse_job_status(&status_str)?,
        job_type: row.try_get("job_type")?,
        memory_ids: serde_json::from_str(&memory_ids_json)?,
        progress_current: progress_current as u32,
        progress_total: progress_total as u32,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        error_message: row.try_get("error_message")?,
    })
}

fn row_to_result(row: &PgRow) -> Result<AnalysisResult> {
    let job_id_str: String = row.try_get("job_id")?;
    Ok(AnalysisResult {
        job_id: Uuid::parse_str(&job_id_str).map_err(|e| PipelineError::Data(format!("corrupt job id: {e}")))?,
        memory_id: row.try_get("memory_id")?,
        memory_type: row.try_get("memory_type")?,
        confidence: row.try_get("confidence")?,
        concepts_json: row.try_get("extracted_concepts")?,
        metadata_json: row.try_get("metadata")?,
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
