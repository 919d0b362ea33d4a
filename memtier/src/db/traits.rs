use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AnalysisJob, AnalysisResult, HealthStatus, Memory, MemoryUpdate, RelationalStats};

/// CRUD over curated memories and job records (C1, §4.1). Both the embedded and networked
/// backends implement identical observable semantics; the only permitted
/// differences are connection/transport details.
///
/// Failure semantics: connection errors surface as `PipelineError::BackendUnavailable`
/// and are retryable by the caller; semantic "not found" conditions return
/// `None`/`false` rather than an error.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Appends a new row; id is auto-assigned by the backend.
    async fn save_memory(&self, category: &str, topic: &str, content: &str) -> Result<Memory>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Memory>>;

    /// Partial update; unset fields are left unchanged. Returns `false` if
    /// `id` is absent.
    async fn update(&self, id: i64, update: &MemoryUpdate) -> Result<bool>;

    /// Equivalent to `update(id, {category: new_category})`, but rejected if
    /// `new_category` is empty.
    async fn move_category(&self, id: i64, new_category: &str) -> Result<bool>;

    /// Physical delete. Used only internally by the pipeline during save
    /// (§4.7) and short-memory eviction (§4.8).
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Case-insensitive substring match over `topic ∪ content`; when
    /// `categories` is non-empty, results are intersected with it.
    async fn search_basic(&self, query: &str, categories: &[String]) -> Result<Vec<Memory>>;

    async fn recent(&self, limit: u32) -> Result<Vec<Memory>>;

    async fn by_category(&self, category: &str, limit: u32) -> Result<Vec<Memory>>;

    async fn list_categories(&self) -> Result<Vec<(String, i64)>>;

    /// Appends to the FIFO-capped `short_memory` category view.
    async fn add_to_short_memory(&self, memory: &Memory) -> Result<()>;

    async fn list_short_memory(&self, limit: u32) -> Result<Vec<Memory>>;

    async fn stats(&self) -> Result<RelationalStats>;

    async fn health(&self) -> Result<HealthStatus>;

    /// Inserts a new job row in `pending` status (C8, §4.9).
    async fn create_job(&self, job: &AnalysisJob) -> Result<()>;

    async fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>>;

    /// Transitions `pending -> running`, stamping `started_at`.
    async fn mark_job_running(&self, id: Uuid) -> Result<()>;

    async fn update_job_progress(&self, id: Uuid, progress_current: u32) -> Result<()>;

    /// Transitions `running -> completed`, stamping `completed_at`.
    async fn mark_job_completed(&self, id: Uuid) -> Result<()>;

    /// Transitions `* -> failed`, stamping `completed_at` and `error_message`.
    async fn mark_job_failed(&self, id: Uuid, error_message: &str) -> Result<()>;

    /// Appends one row per analyzed memory within a job; results are
    /// appended in submission order (§5).
    async fn append_analysis_result(&self, result: &AnalysisResult) -> Result<()>;

    async fn list_analysis_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>>;
}
