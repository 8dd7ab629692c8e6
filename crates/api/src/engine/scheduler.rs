//! Batch scheduler: a FIFO of batches with a global cap on how many run at
//! once. Jobs inside a batch run strictly one after another.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use vimax_core::batch::{BatchJobResult, BatchRecord, BatchStatus};
use vimax_core::generation::{GenerationRequest, JobSpec};
use vimax_core::types::{batch_job_id, BatchId};
use vimax_db::repositories::BatchRepo;
use vimax_db::DbPool;

use crate::engine::error::EngineError;
use crate::engine::orchestrator::{JobOrchestrator, JobOutcome};

#[derive(Default)]
struct DispatchState {
    queue: VecDeque<BatchId>,
    active: HashSet<BatchId>,
}

/// Queue depth and running count, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerLoad {
    pub queued: usize,
    pub active: usize,
    pub max_concurrent: usize,
}

pub struct BatchScheduler {
    pool: DbPool,
    orchestrator: Arc<JobOrchestrator>,
    max_concurrent: usize,
    state: Mutex<DispatchState>,
}

impl BatchScheduler {
    pub fn new(pool: DbPool, orchestrator: Arc<JobOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            pool,
            orchestrator,
            max_concurrent: max_concurrent.max(1),
            state: Mutex::new(DispatchState::default()),
        }
    }

    /// Validate, persist as `queued`, and enqueue a batch.
    ///
    /// Nothing is stored when validation fails.
    pub async fn submit(
        self: &Arc<Self>,
        user_id: &str,
        name: Option<String>,
        jobs: Vec<GenerationRequest>,
    ) -> Result<BatchRecord, EngineError> {
        let batch = BatchRecord::new(user_id, name, jobs)?;
        BatchRepo::save(&self.pool, &batch).await?;

        tracing::info!(
            batch_id = %batch.batch_id,
            user_id = %batch.user_id,
            total_jobs = batch.jobs.len(),
            "Batch queued",
        );
        self.enqueue(batch.batch_id.clone());
        Ok(batch)
    }

    /// Re-enqueue batches left unfinished by a previous run.
    ///
    /// Interrupted batches go first and resume after their last recorded
    /// result; queued batches follow in submission order.
    pub async fn recover(self: &Arc<Self>) -> Result<usize, EngineError> {
        let mut recovered = 0;
        for status in [BatchStatus::Processing, BatchStatus::Queued] {
            for batch in BatchRepo::list_by_status(&self.pool, status).await? {
                tracing::info!(
                    batch_id = %batch.batch_id,
                    status = status.as_str(),
                    next_job = ?batch.next_job_index(),
                    "Recovering batch",
                );
                self.enqueue(batch.batch_id);
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    pub fn load(&self) -> SchedulerLoad {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        SchedulerLoad {
            queued: state.queue.len(),
            active: state.active.len(),
            max_concurrent: self.max_concurrent,
        }
    }

    fn enqueue(self: &Arc<Self>, batch_id: BatchId) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .push_back(batch_id);
        self.dispatch();
    }

    /// Start queued batches while there is capacity.
    fn dispatch(self: &Arc<Self>) {
        let ready: Vec<BatchId> = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let mut ready = Vec::new();
            while state.active.len() < self.max_concurrent {
                let Some(batch_id) = state.queue.pop_front() else {
                    break;
                };
                if state.active.insert(batch_id.clone()) {
                    ready.push(batch_id);
                }
            }
            ready
        };

        for batch_id in ready {
            let this = Arc::clone(self);
            tokio::spawn(this.run_batch(batch_id));
        }
    }

    async fn run_batch(self: Arc<Self>, batch_id: BatchId) {
        if let Err(e) = self.process_batch(&batch_id).await {
            tracing::error!(batch_id = %batch_id, error = %e, "Batch processing aborted");
        }

        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .remove(&batch_id);
        self.dispatch();
    }

    async fn process_batch(&self, batch_id: &str) -> Result<(), EngineError> {
        let Some(mut batch) = BatchRepo::find(&self.pool, batch_id).await? else {
            tracing::warn!(batch_id = %batch_id, "Queued batch no longer exists");
            return Ok(());
        };

        match batch.status {
            BatchStatus::Completed => return Ok(()),
            BatchStatus::Queued => {
                batch.mark_processing()?;
                BatchRepo::save(&self.pool, &batch).await?;
                tracing::info!(batch_id = %batch_id, "Batch started");
            }
            BatchStatus::Processing => {}
        }

        while let Some(index) = batch.next_job_index() {
            let job_id = batch_job_id(batch_id, index);
            let spec = JobSpec::new(batch.jobs[index].clone()).with_user(batch.user_id.clone());

            let result = match self.orchestrator.run(&job_id, spec).await {
                JobOutcome::Completed { video_url, .. } => {
                    BatchJobResult::completed(index, job_id, video_url)
                }
                JobOutcome::Failed { error } => BatchJobResult::failed(index, job_id, error),
            };
            batch.record_result(result)?;

            if let Err(e) = BatchRepo::save(&self.pool, &batch).await {
                tracing::warn!(batch_id = %batch_id, job_index = index, error = %e, "Failed to save batch progress");
            }
        }

        batch.mark_completed()?;
        BatchRepo::save(&self.pool, &batch).await?;
        tracing::info!(
            batch_id = %batch_id,
            completed = batch.progress.completed,
            failed = batch.progress.failed,
            "Batch finished",
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;
    use vimax_core::batch::BatchJobStatus;
    use vimax_core::error::CoreError;

    use super::*;
    use crate::engine::test_support::{harness, registry_with, FailingPipeline, WritingPipeline};

    fn jobs(n: usize) -> Vec<GenerationRequest> {
        (0..n)
            .map(|i| GenerationRequest::idea2video(format!("idea {i}")))
            .collect()
    }

    fn jobs_from(seed: usize) -> Vec<GenerationRequest> {
        vec![GenerationRequest::idea2video(format!("unique {seed}"))]
    }

    async fn wait_for_completion(pool: &DbPool, batch_id: &str) -> BatchRecord {
        for _ in 0..250 {
            let batch = BatchRepo::find(pool, batch_id)
                .await
                .expect("find")
                .expect("batch exists");
            if batch.status == BatchStatus::Completed {
                return batch;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("batch {batch_id} did not complete");
    }

    #[tokio::test]
    async fn batch_runs_every_job_in_order() {
        let h = harness(registry_with(Arc::new(WritingPipeline::default()))).await;
        let scheduler = Arc::new(BatchScheduler::new(h.pool.clone(), h.orchestrator.clone(), 2));

        let batch = scheduler
            .submit("alice", Some("trio".into()), jobs(3))
            .await
            .expect("submit");
        assert_eq!(batch.status, BatchStatus::Queued);

        let done = wait_for_completion(&h.pool, &batch.batch_id).await;
        assert_eq!(done.progress.completed, 3);
        assert_eq!(done.progress.failed, 0);
        let indices: Vec<usize> = done.results.iter().map(|r| r.job_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(done.results[1].job_id, batch_job_id(&batch.batch_id, 1));
        assert!(done.started_at.is_some());
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn failed_jobs_do_not_stop_the_batch() {
        let h = harness(registry_with(Arc::new(FailingPipeline("boom")))).await;
        let scheduler = Arc::new(BatchScheduler::new(h.pool.clone(), h.orchestrator.clone(), 2));

        let batch = scheduler.submit("alice", None, jobs(2)).await.expect("submit");

        let done = wait_for_completion(&h.pool, &batch.batch_id).await;
        assert_eq!(done.progress.failed, 2);
        assert!(done
            .results
            .iter()
            .all(|r| r.status == BatchJobStatus::Failed));
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_persisting() {
        let h = harness(registry_with(Arc::new(WritingPipeline::default()))).await;
        let scheduler = Arc::new(BatchScheduler::new(h.pool.clone(), h.orchestrator.clone(), 2));

        let result = scheduler.submit("alice", None, jobs(11)).await;

        assert_matches!(result, Err(EngineError::Core(CoreError::Validation(_))));
        let listed = BatchRepo::list_by_user(&h.pool, "alice").await.expect("list");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn concurrent_batches_never_exceed_the_cap() {
        let pipeline = Arc::new(WritingPipeline::with_delay(Duration::from_millis(40)));
        let h = harness(registry_with(pipeline.clone())).await;
        let scheduler = Arc::new(BatchScheduler::new(h.pool.clone(), h.orchestrator.clone(), 2));

        let mut ids = Vec::new();
        for i in 0..4 {
            let batch = scheduler
                .submit("alice", Some(format!("b{i}")), jobs_from(i))
                .await
                .expect("submit");
            ids.push(batch.batch_id);
        }
        assert!(scheduler.load().active <= 2);

        for id in &ids {
            wait_for_completion(&h.pool, id).await;
        }
        assert_eq!(pipeline.calls(), 4);
        assert!(pipeline.max_in_flight.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn recover_resumes_interrupted_batch_after_last_result() {
        let pipeline = Arc::new(WritingPipeline::default());
        let h = harness(registry_with(pipeline.clone())).await;

        let mut batch = BatchRecord::new("alice", None, jobs(3)).expect("batch");
        batch.mark_processing().expect("processing");
        batch
            .record_result(BatchJobResult::completed(
                0,
                batch_job_id(&batch.batch_id, 0),
                "/videos/x/final_video.mp4",
            ))
            .expect("result");
        BatchRepo::save(&h.pool, &batch).await.expect("save");

        let scheduler = Arc::new(BatchScheduler::new(h.pool.clone(), h.orchestrator.clone(), 2));
        let recovered = scheduler.recover().await.expect("recover");
        assert_eq!(recovered, 1);

        let done = wait_for_completion(&h.pool, &batch.batch_id).await;
        assert_eq!(done.results.len(), 3);
        assert_eq!(pipeline.calls(), 2);
    }
}
