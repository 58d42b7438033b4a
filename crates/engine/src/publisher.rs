//! In-process fan-out of job progress events, backed by a
//! `tokio::sync::broadcast` channel.
//!
//! Publishing is fire-and-forget: a send error only means there are
//! zero receivers, and slow subscribers observe `Lagged` rather than
//! blocking the worker's critical path. Every `progress` payload is a
//! full snapshot of the job, so subscribers never need history replay.

use serde_json::json;
use tokio::sync::broadcast;

use corral_core::job_events::{
    MSG_TYPE_COMPLETE, MSG_TYPE_CONNECTED, MSG_TYPE_ERROR, MSG_TYPE_PROGRESS,
};
use corral_core::types::DbId;
use corral_db::models::job::Job;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// One stream message concerning a single job.
#[derive(Debug, Clone)]
pub struct JobStreamEvent {
    pub job_id: DbId,
    /// JSON object carrying a `type` field plus the message payload.
    pub payload: serde_json::Value,
}

/// Publishes job mutations to any number of subscribers.
///
/// Cheap to clone; all clones share one channel.
#[derive(Clone)]
pub struct ProgressPublisher {
    sender: broadcast::Sender<JobStreamEvent>,
}

impl ProgressPublisher {
    /// Create a publisher with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all job events. Callers filter by `job_id`.
    pub fn subscribe(&self) -> broadcast::Receiver<JobStreamEvent> {
        self.sender.subscribe()
    }

    /// Publish a full `progress` snapshot of a job.
    pub fn progress(&self, job: &Job) {
        self.send(job.id, snapshot_payload(MSG_TYPE_PROGRESS, job));
    }

    /// Publish the terminal `complete` message for a job. Subscribers
    /// may close their stream after receiving it.
    pub fn complete(&self, job: &Job) {
        self.send(job.id, snapshot_payload(MSG_TYPE_COMPLETE, job));
    }

    /// Publish a stream-level error for a job. Does not affect job
    /// state; job-level failures travel as `progress`/`complete`
    /// snapshots with `status = failed`.
    pub fn stream_error(&self, job_id: DbId, message: &str) {
        self.send(
            job_id,
            json!({ "type": MSG_TYPE_ERROR, "job_id": job_id, "message": message }),
        );
    }

    fn send(&self, job_id: DbId, payload: serde_json::Value) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(JobStreamEvent { job_id, payload });
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Build a `{type, job}` payload carrying a full job snapshot.
///
/// Serialization of a [`Job`] cannot fail, but a stream message that
/// somehow did would be logged and skipped, not propagated to the job.
pub fn snapshot_payload(msg_type: &str, job: &Job) -> serde_json::Value {
    match serde_json::to_value(job) {
        Ok(job_value) => json!({ "type": msg_type, "job": job_value }),
        Err(e) => {
            tracing::error!(job_id = job.id, error = %e, "Failed to serialize job snapshot");
            json!({ "type": MSG_TYPE_ERROR, "job_id": job.id, "message": "snapshot serialization failed" })
        }
    }
}

/// Build the `connected` acknowledgement payload for a new subscriber.
pub fn connected_payload(job: &Job) -> serde_json::Value {
    snapshot_payload(MSG_TYPE_CONNECTED, job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use corral_db::models::status::JobStatus;

    fn sample_job(id: DbId) -> Job {
        Job {
            id,
            job_type: "generate".to_string(),
            status: JobStatus::Running,
            owner_id: None,
            progress: 40,
            metadata: json!({"checkpoint": {"next_index": 400}}),
            result_data: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_snapshots() {
        let publisher = ProgressPublisher::default();
        let mut rx = publisher.subscribe();

        publisher.progress(&sample_job(7));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, 7);
        assert_eq!(event.payload["type"], MSG_TYPE_PROGRESS);
        assert_eq!(event.payload["job"]["progress"], 40);
        assert_eq!(event.payload["job"]["status"], "running");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let publisher = ProgressPublisher::default();
        publisher.complete(&sample_job(1));
        publisher.stream_error(1, "boom");
    }

    #[tokio::test]
    async fn multiple_subscribers_see_the_same_event() {
        let publisher = ProgressPublisher::default();
        let mut rx1 = publisher.subscribe();
        let mut rx2 = publisher.subscribe();

        publisher.complete(&sample_job(3));

        assert_eq!(rx1.recv().await.unwrap().payload["type"], MSG_TYPE_COMPLETE);
        assert_eq!(rx2.recv().await.unwrap().payload["type"], MSG_TYPE_COMPLETE);
    }

    #[test]
    fn connected_payload_carries_snapshot() {
        let payload = connected_payload(&sample_job(9));
        assert_eq!(payload["type"], MSG_TYPE_CONNECTED);
        assert_eq!(payload["job"]["id"], 9);
    }
}
