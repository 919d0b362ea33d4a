use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Async batch unit (§3, §4.9). Status transitions form a DAG:
/// `pending -> running -> (completed | failed)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub job_type: String,
    pub memory_ids: Vec<i64>,
    pub progress_current: u32,
    pub progress_total: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl AnalysisJob {
    pub fn new(id: Uuid, job_type: impl Into<String>, memory_ids: Vec<i64>) -> Self {
        let total = memory_ids.len() as u32;
        Self {
            id,
            status: JobStatus::Pending,
            job_type: job_type.into(),
            memory_ids,
            progress_current: 0,
            progress_total: total,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }
}

/// One row appended per analyzed memory within a job (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub job_id: Uuid,
    pub memory_id: i64,
    pub memory_type: String,
    pub confidence: f32,
    pub concepts_json: String,
    pub metadata_json: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_progress_total_matches_memory_count() {
        let job = AnalysisJob::new(Uuid::new_v4(), "batch_analyze", vec![1, 2, 3]);
        assert_eq!(job.progress_total, 3);
        assert_eq!(job.progress_current, 0);
        assert_eq!(job.status, JobStatus::Pending);
    }
}
