//! Bounded worker pool and per-job execution loop.
//!
//! A single dispatcher task polls for pending jobs and claims them
//! atomically via [`JobRepo::claim_next`]. Each claimed job runs on its
//! own task under a semaphore permit, executing units of work linearly:
//! one unit completes and commits its checkpoint before the next
//! begins, so the checkpoint chain stays consistent. Parallelism exists
//! across jobs only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use corral_core::retry::{backoff_delay, MAX_UNIT_ATTEMPTS};
use corral_core::types::DbId;
use corral_db::models::job::Job;
use corral_db::models::status::JobStatus;
use corral_db::repositories::JobRepo;
use corral_db::DbPool;

use crate::publisher::ProgressPublisher;
use crate::registry::{HandlerRegistry, JobView, UnitError, UnitOutcome};

/// Default number of jobs executing concurrently.
const DEFAULT_CONCURRENCY: usize = 4;

/// Default polling interval for the dispatcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tunable execution parameters for the worker pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Global ceiling on concurrently executing jobs.
    pub concurrency: usize,
    /// How often the dispatcher scans for pending jobs.
    pub poll_interval: Duration,
    /// Attempts per unit of work before the job is failed.
    pub max_unit_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_unit_attempts: MAX_UNIT_ATTEMPTS,
        }
    }
}

/// Claims pending jobs and drives their handlers to completion.
pub struct WorkerPool {
    pool: DbPool,
    registry: Arc<HandlerRegistry>,
    publisher: ProgressPublisher,
    config: EngineConfig,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        pool: DbPool,
        registry: Arc<HandlerRegistry>,
        publisher: ProgressPublisher,
        config: EngineConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            pool,
            registry,
            publisher,
            config,
            semaphore,
        }
    }

    /// Run the dispatcher loop until the cancellation token is
    /// triggered. In-flight jobs finish their current unit and keep
    /// running to completion unless the process exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker pool started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.dispatch_cycle().await;
                }
            }
        }
    }

    /// One dispatch cycle: claim pending jobs while permits are free.
    async fn dispatch_cycle(&self) {
        loop {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                // Pool saturated; next tick will try again.
                return;
            };

            match JobRepo::claim_next(&self.pool).await {
                Ok(Some(job)) => {
                    tracing::info!(job_id = job.id, job_type = %job.job_type, "Job claimed");
                    self.spawn_job(job, permit);
                }
                Ok(None) => return,
                Err(e) => {
                    // Engine error: nothing was claimed, the queue is
                    // retried on the next tick.
                    tracing::error!(error = %e, "Claim cycle failed");
                    return;
                }
            }
        }
    }

    /// Resume a job that is already `running` (recovery path). The job
    /// waits for a free permit like any other.
    pub fn resume(&self, job: Job) {
        let semaphore = Arc::clone(&self.semaphore);
        let pool = self.pool.clone();
        let registry = Arc::clone(&self.registry);
        let publisher = self.publisher.clone();
        let max_attempts = self.config.max_unit_attempts;
        tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            run_job(pool, registry, publisher, max_attempts, job).await;
        });
    }

    fn spawn_job(&self, job: Job, permit: OwnedSemaphorePermit) {
        let pool = self.pool.clone();
        let registry = Arc::clone(&self.registry);
        let publisher = self.publisher.clone();
        let max_attempts = self.config.max_unit_attempts;
        tokio::spawn(async move {
            let _permit = permit;
            run_job(pool, registry, publisher, max_attempts, job).await;
        });
    }
}

/// Drive one job's unit loop to a terminal state.
///
/// Before every unit the status is re-read so an external cancel is
/// honored at the next unit boundary. Store failures abort the loop and
/// leave the job `running`; the startup recovery sweep picks it up.
async fn run_job(
    pool: DbPool,
    registry: Arc<HandlerRegistry>,
    publisher: ProgressPublisher,
    max_attempts: u32,
    job: Job,
) {
    let job_id = job.id;

    let Some(handler) = registry.get(&job.job_type) else {
        tracing::error!(job_id, job_type = %job.job_type, "No handler registered");
        fail_and_publish(
            &pool,
            &publisher,
            job_id,
            &format!("No handler registered for job type '{}'", job.job_type),
        )
        .await;
        return;
    };

    publisher.progress(&job);

    loop {
        // Cancellation check at the unit boundary.
        let current = match JobRepo::find_by_id(&pool, job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                // Row deleted out from under the worker; tell
                // subscribers so their streams do not hang.
                tracing::warn!(job_id, "Job disappeared mid-execution");
                publisher.stream_error(job_id, "Job was deleted during execution");
                return;
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to re-read job status");
                return;
            }
        };
        match current.status {
            JobStatus::Running => {}
            JobStatus::Cancelled => {
                tracing::info!(job_id, "Cancellation observed, stopping");
                publisher.complete(&current);
                return;
            }
            other => {
                tracing::warn!(job_id, status = %other, "Unexpected status, stopping");
                return;
            }
        }

        let checkpoint = current.checkpoint().cloned();
        let view = JobView::from(&current);

        let outcome = match execute_with_retry(handler.as_ref(), &view, checkpoint, max_attempts)
            .await
        {
            Ok(outcome) => outcome,
            Err(message) => {
                fail_and_publish(&pool, &publisher, job_id, &message).await;
                return;
            }
        };

        let target_progress = current.progress + outcome.progress_delta.max(0);
        let committed = match JobRepo::commit_unit(
            &pool,
            job_id,
            target_progress,
            &outcome.counters_patch,
            outcome.new_checkpoint.as_ref(),
            outcome.partial_result.as_ref(),
        )
        .await
        {
            Ok(committed) => committed,
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to commit unit");
                return;
            }
        };

        if !committed {
            // Cancelled or deleted between the status check and the
            // commit; the checkpoint stays at the last committed unit.
            match JobRepo::find_by_id(&pool, job_id).await {
                Ok(Some(job)) if job.status == JobStatus::Cancelled => {
                    tracing::info!(job_id, "Cancelled during unit, commit dropped");
                    publisher.complete(&job);
                }
                Ok(None) => {
                    tracing::warn!(job_id, "Job deleted during unit, commit dropped");
                    publisher.stream_error(job_id, "Job was deleted during execution");
                }
                _ => {}
            }
            return;
        }

        if outcome.done {
            if let Err(e) = JobRepo::complete(&pool, job_id, None).await {
                tracing::error!(job_id, error = %e, "Failed to mark job completed");
                return;
            }
            if let Ok(Some(job)) = JobRepo::find_by_id(&pool, job_id).await {
                tracing::info!(job_id, "Job completed");
                publisher.complete(&job);
            }
            return;
        }

        if let Ok(Some(job)) = JobRepo::find_by_id(&pool, job_id).await {
            publisher.progress(&job);
        }
    }
}

/// Execute one unit, retrying transient errors with exponential
/// backoff. Returns the error message to record when attempts are
/// exhausted or the handler raises a fatal error.
async fn execute_with_retry(
    handler: &dyn crate::registry::TaskHandler,
    view: &JobView,
    checkpoint: Option<serde_json::Value>,
    max_attempts: u32,
) -> Result<UnitOutcome, String> {
    let mut attempt: u32 = 1;
    loop {
        match handler.execute_unit(view, checkpoint.as_ref()).await {
            Ok(outcome) => return Ok(outcome),
            Err(UnitError::Transient(message)) if attempt < max_attempts => {
                let delay = backoff_delay(attempt);
                tracing::warn!(
                    job_id = view.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transient unit error, retrying",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(UnitError::Transient(message)) => {
                tracing::error!(job_id = view.id, attempts = attempt, error = %message, "Retries exhausted");
                return Err(message);
            }
            Err(UnitError::Fatal(message)) => {
                tracing::error!(job_id = view.id, error = %message, "Fatal unit error");
                return Err(message);
            }
        }
    }
}

async fn fail_and_publish(pool: &DbPool, publisher: &ProgressPublisher, job_id: DbId, message: &str) {
    match JobRepo::fail(pool, job_id, message).await {
        Ok(_) => {
            if let Ok(Some(job)) = JobRepo::find_by_id(pool, job_id).await {
                publisher.complete(&job);
            }
        }
        Err(e) => {
            tracing::error!(job_id, error = %e, "Failed to mark job as failed");
        }
    }
}
