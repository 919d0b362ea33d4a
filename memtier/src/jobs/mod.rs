use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::analyzer::SemanticAnalyzer;
use crate::db::RelationalStore;
use crate::error::Result;
use crate::models::{AnalysisJob, AnalysisResult};

/// Bound on in-flight job submissions (§4.9, §5): generous enough that
/// `submit` never blocks in practice, while still capping queue growth.
const JOB_QUEUE_CAPACITY: usize = 256;

/// The job manager (C8, §4.9): a single dedicated worker processing
/// `AnalysisJob`s serially, to avoid contending with `save`'s own LLM calls
/// for rate-limit budget.
#[derive(Clone)]
pub struct JobManager {
    sender: mpsc::Sender<Uuid>,
    cancelled: Arc<Mutex<HashSet<Uuid>>>,
}

impl JobManager {
    /// Spawns the worker task and returns a handle. Must be called from
    /// within a running Tokio runtime.
    pub fn new(relational: Arc<dyn RelationalStore>, analyzer: Arc<SemanticAnalyzer>) -> Self {
        let (sender, receiver) = mpsc::channel(JOB_QUEUE_CAPACITY);
        let cancelled = Arc::new(Mutex::new(HashSet::new()));

        tokio::spawn(run_worker(receiver, relational, analyzer, cancelled.clone()));

        Self { sender, cancelled }
    }

    /// `batch_analyze_memories` (§4.9). Persists the job row and enqueues it;
    /// returns as soon as both complete, before any item is processed.
    pub async fn submit(
        &self,
        relational: &dyn RelationalStore,
        job_type: &str,
        memory_ids: Vec<i64>,
    ) -> Result<Uuid> {
        let job = AnalysisJob::new(Uuid::new_v4(), job_type, memory_ids);
        let id = job.id;
        relational.create_job(&job).await?;

        if self.sender.send(id).await.is_err() {
            tracing::error!(job_id = %id, "job worker channel closed, job will never run");
        }

        Ok(id)
    }

    /// `cancel(id)` (§4.9). Takes effect before the worker starts the next
    /// item, never mid-item.
    pub async fn cancel(&self, job_id: Uuid) {
        self.cancelled.lock().await.insert(job_id);
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Uuid>,
    relational: Arc<dyn RelationalStore>,
    analyzer: Arc<SemanticAnalyzer>,
    cancelled: Arc<Mutex<HashSet<Uuid>>>,
) {
    while let Some(job_id) = receiver.recv().await {
        if let Err(error) = process_job(job_id, relational.as_ref(), analyzer.as_ref(), &cancelled).await {
            tracing::error!(%error, %job_id, "analysis job failed");
            let _ = relational.mark_job_failed(job_id, &error.to_string()).await;
        }
        cancelled.lock().await.remove(&job_id);
    }
}

async fn process_job(
    job_id: Uuid,
    relational: &dyn RelationalStore,
    analyzer: &SemanticAnalyzer,
    cancelled: &Mutex<HashSet<Uuid>>,
) -> Result<()> {
    let Some(job) = relational.get_job(job_id).await? else {
        tracing::warn!(%job_id, "job vanished before worker picked it up");
        return Ok(());
    };

    relational.mark_job_running(job_id).await?;

    for (index, memory_id) in job.memory_ids.iter().enumerate() {
        if cancelled.lock().await.contains(&job_id) {
            relational.mark_job_failed(job_id, "cancelled").await?;
            return Ok(());
        }

        match relational.get_by_id(*memory_id).await {
            Ok(Some(memory)) => {
                let classification = analyzer.classify_and_extract(&memory).await;
                let confidence = classification.concepts.first().map(|c| c.confidence).unwrap_or(0.0);
                let concepts_json = serde_json::to_string(&classification.concepts).unwrap_or_else(|_| "[]".to_string());
                let metadata_json = serde_json::json!({ "concept_count": classification.concepts.len() }).to_string();

                let result = AnalysisResult {
                    job_id,
                    memory_id: *memory_id,
                    memory_type: classification.memory_type.to_string(),
                    confidence,
                    concepts_json,
                    metadata_json,
                };
                relational.append_analysis_result(&result).await?;
            }
            Ok(None) => {
                tracing::warn!(memory_id, %job_id, "memory not found for analysis job, skipping");
            }
            Err(error) => {
                tracing::warn!(%error, memory_id, %job_id, "failed to load memory for analysis, skipping");
            }
        }

        relational.update_job_progress(job_id, (index + 1) as u32).await?;
    }

    relational.mark_job_completed(job_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmProvider;
    use crate::models::{HealthStatus, Memory, MemoryUpdate, RelationalStats};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Default)]
    struct MockStore {
        memories: TokioMutex<HashMap<i64, Memory>>,
        jobs: TokioMutex<HashMap<Uuid, AnalysisJob>>,
        results: TokioMutex<Vec<AnalysisResult>>,
    }

    #[async_trait]
    impl RelationalStore for MockStore {
        async fn save_memory(&self, category: &str, topic: &str, content: &str) -> Result<Memory> {
            let mut memories = self.memories.lock().await;
            let id = memories.len() as i64 + 1;
            let memory = Memory::new(id, category, topic, content);
            memories.insert(id, memory.clone());
            Ok(memory)
        }

        async fn get_by_id(&self, id: i64) -> Result<Option<Memory>> {
            Ok(self.memories.lock().await.get(&id).cloned())
        }

        async fn update(&self, _id: i64, _update: &MemoryUpdate) -> Result<bool> {
            Ok(true)
        }

        async fn move_category(&self, _id: i64, _new_category: &str) -> Result<bool> {
            Ok(true)
        }

        async fn delete(&self, id: i64) -> Result<bool> {
            Ok(self.memories.lock().await.remove(&id).is_some())
        }

        async fn search_basic(&self, _query: &str, _categories: &[String]) -> Result<Vec<Memory>> {
            Ok(Vec::new())
        }

        async fn recent(&self, _limit: u32) -> Result<Vec<Memory>> {
            Ok(Vec::new())
        }

        async fn by_category(&self, _category: &str, _limit: u32) -> Result<Vec<Memory>> {
            Ok(Vec::new())
        }

        async fn list_categories(&self) -> Result<Vec<(String, i64)>> {
            Ok(Vec::new())
        }

        async fn add_to_short_memory(&self, _memory: &Memory) -> Result<()> {
            Ok(())
        }

        async fn list_short_memory(&self, _limit: u32) -> Result<Vec<Memory>> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<RelationalStats> {
            Ok(RelationalStats {
                total: 0,
                by_category: HashMap::new(),
                db_type: "mock".to_string(),
            })
        }

        async fn health(&self) -> Result<HealthStatus> {
            Ok(HealthStatus { ok: true, detail: "mock".to_string() })
        }

        async fn create_job(&self, job: &AnalysisJob) -> Result<()> {
            self.jobs.lock().await.insert(job.id, job.clone());
            Ok(())
        }

        async fn get_job(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
            Ok(self.jobs.lock().await.get(&id).cloned())
        }

        async fn mark_job_running(&self, id: Uuid) -> Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(&id) {
                job.status = crate::models::JobStatus::Running;
            }
            Ok(())
        }

        async fn update_job_progress(&self, id: Uuid, progress_current: u32) -> Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(&id) {
                job.progress_current = progress_current;
            }
            Ok(())
        }

        async fn mark_job_completed(&self, id: Uuid) -> Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(&id) {
                job.status = crate::models::JobStatus::Completed;
            }
            Ok(())
        }

        async fn mark_job_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
            if let Some(job) = self.jobs.lock().await.get_mut(&id) {
                job.status = crate::models::JobStatus::Failed;
                job.error_message = Some(error_message.to_string());
            }
            Ok(())
        }

        async fn append_analysis_result(&self, result: &AnalysisResult) -> Result<()> {
            self.results.lock().await.push(result.clone());
            Ok(())
        }

        async fn list_analysis_results(&self, job_id: Uuid) -> Result<Vec<AnalysisResult>> {
            Ok(self.results.lock().await.iter().filter(|r| r.job_id == job_id).cloned().collect())
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never became true");
    }

    #[tokio::test]
    async fn test_submit_processes_job_to_completion() {
        let store = Arc::new(MockStore::default());
        let m1 = store.save_memory("debug", "t1", "c1").await.unwrap();
        let m2 = store.save_memory("debug", "t2", "c2").await.unwrap();

        let analyzer = Arc::new(SemanticAnalyzer::new(LlmProvider::unavailable("no llm in tests")));
        let manager = JobManager::new(store.clone() as Arc<dyn RelationalStore>, analyzer);

        let job_id = manager
            .submit(store.as_ref(), "batch_analyze", vec![m1.id, m2.id])
            .await
            .unwrap();

        wait_until(|| {
            job_status(&store, job_id) == Some(crate::models::JobStatus::Completed)
        })
        .await;

        let results = store.list_analysis_results(job_id).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_item() {
        let store = Arc::new(MockStore::default());
        let m1 = store.save_memory("debug", "t1", "c1").await.unwrap();

        let analyzer = Arc::new(SemanticAnalyzer::new(LlmProvider::unavailable("no llm in tests")));
        let manager = JobManager::new(store.clone() as Arc<dyn RelationalStore>, analyzer);

        manager.cancel(Uuid::new_v4()).await;

        let job_id = manager.submit(store.as_ref(), "batch_analyze", vec![m1.id]).await.unwrap();
        manager.cancel(job_id).await;

        wait_until(|| {
            matches!(
                job_status(&store, job_id),
                Some(crate::models::JobStatus::Failed)
            )
        })
        .await;

        let job = store.get_job(job_id).await.unwrap().unwrap();
        assert_eq!(job.error_message.as_deref(), Some("cancelled"));
    }

    fn job_status(store: &Arc<MockStore>, job_id: Uuid) -> Option<crate::models::JobStatus> {
        store.jobs.try_lock().ok().and_then(|jobs| jobs.get(&job_id).map(|j| j.status))
    }
}
