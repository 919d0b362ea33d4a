use sqlx::PgPool;

use crate::error::{PipelineError, Result};

/// Logical schema from SPEC_FULL.md §6.3, expressed in Postgres DDL.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS memories (
            id BIGSERIAL PRIMARY KEY,
            date DATE NOT NULL,
            category TEXT NOT NULL,
            topic TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_category ON memories(category)")
        .execute(pool)
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at)")
        .execute(pool)
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            job_type TEXT NOT NULL,
            memory_ids TEXT NOT NULL,
            progress_current INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analysis_jobs_status ON analysis_jobs(status)")
        .execute(pool)
        .await
        .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id BIGSERIAL PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES analysis_jobs(id),
            memory_id BIGINT NOT NULL,
            memory_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            extracted_concepts TEXT NOT NULL,
            metadata TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| PipelineError::BackendUnavailable(e.to_string()))?;

    Ok(())
}
