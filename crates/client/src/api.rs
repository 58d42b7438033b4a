//! The client-side view of the jobs API.
//!
//! [`JobApi`] is the seam between the tracker logic and the transport;
//! tests substitute a mock, production uses [`crate::HttpJobApi`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use corral_core::types::DbId;

/// Job lifecycle states as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// True once the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// A point-in-time view of one job record.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSnapshot {
    pub id: DbId,
    pub job_type: String,
    pub status: JobState,
    pub progress: i64,
    #[serde(default)]
    pub metadata: Value,
    pub result_data: Option<Value>,
    pub error_message: Option<String>,
}

/// One message from a job's progress stream.
///
/// `type` is `connected`, `progress`, `complete`, or `error`. The first
/// three carry a full [`JobSnapshot`]; `error` is a stream-level fault
/// and carries none.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub job: Option<JobSnapshot>,
    pub message: Option<String>,
}

/// Errors surfaced by a [`JobApi`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The job does not exist (or was deleted).
    #[error("Job {0} not found")]
    NotFound(DbId),

    /// The job belongs to another owner.
    #[error("Access to job {0} denied")]
    Forbidden(DbId),

    /// Network or protocol failure; the job's state is unknown.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Operations the tracker needs from the server.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Fetch the current record of a job.
    async fn fetch(&self, job_id: DbId) -> Result<JobSnapshot, ApiError>;

    /// Request cancellation. Idempotent; returns the current record.
    async fn cancel(&self, job_id: DbId) -> Result<JobSnapshot, ApiError>;

    /// Delete the job record (cancelling it first if still active).
    async fn delete(&self, job_id: DbId) -> Result<(), ApiError>;

    /// Open the progress stream for a job. The stream ends after the
    /// terminal `complete` message.
    async fn subscribe(
        &self,
        job_id: DbId,
    ) -> Result<BoxStream<'static, Result<StreamMessage, ApiError>>, ApiError>;
}
