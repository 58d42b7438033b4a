//! Startup recovery sweep for jobs interrupted by a process restart.
//!
//! Any job still marked `running` at startup lost its worker. If it has
//! a checkpoint, execution resumes from the last committed unit (the
//! checkpoint is the sole recovery artifact); without one there is
//! nothing safe to resume from and the job is failed.

use corral_db::repositories::JobRepo;
use corral_db::DbPool;

use crate::worker::WorkerPool;

/// Message recorded on jobs that cannot be resumed.
const LOST_WORKER_ERROR: &str = "Worker lost without a resumable checkpoint";

/// Outcome counts of a recovery sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub resumed: usize,
    pub failed: usize,
}

/// Sweep `running` jobs: resume the checkpointed ones on `workers`,
/// fail the rest.
pub async fn recover_interrupted(
    pool: &DbPool,
    workers: &WorkerPool,
) -> Result<RecoveryReport, sqlx::Error> {
    let mut report = RecoveryReport::default();

    for job in JobRepo::list_running(pool).await? {
        if job.checkpoint().is_some() {
            tracing::info!(job_id = job.id, job_type = %job.job_type, "Resuming from checkpoint");
            workers.resume(job);
            report.resumed += 1;
        } else {
            tracing::warn!(job_id = job.id, job_type = %job.job_type, "No checkpoint, failing job");
            JobRepo::fail(pool, job.id, LOST_WORKER_ERROR).await?;
            report.failed += 1;
        }
    }

    if report.resumed > 0 || report.failed > 0 {
        tracing::info!(
            resumed = report.resumed,
            failed = report.failed,
            "Recovery sweep finished",
        );
    }

    Ok(report)
}
