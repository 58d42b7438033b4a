//! Periodic cleanup of old terminal jobs.
//!
//! Spawned as a background task that deletes `completed`, `failed`,
//! and `cancelled` jobs older than the configured retention period.
//! Runs on a fixed interval until cancelled.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use corral_db::repositories::JobRepo;
use corral_db::DbPool;

/// How often the cleanup runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention cleanup loop until `cancel` is triggered.
///
/// Deletes terminal jobs whose `completed_at` is older than
/// `max_age_hours`.
pub async fn run(pool: DbPool, max_age_hours: i64, cancel: CancellationToken) {
    tracing::info!(
        max_age_hours,
        interval_secs = SWEEP_INTERVAL.as_secs(),
        "Job retention sweep started",
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention sweep stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
                match JobRepo::delete_terminal_older_than(&pool, cutoff).await {
                    Ok(deleted) => {
                        if deleted > 0 {
                            tracing::info!(deleted, "Job retention: purged old terminal jobs");
                        } else {
                            tracing::debug!("Job retention: nothing to purge");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Job retention: sweep failed");
                    }
                }
            }
        }
    }
}
