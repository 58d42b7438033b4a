//! Job entity model and DTOs for the persistent job execution engine.

use corral_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub job_type: String,
    pub status: JobStatus,
    /// Identity of the submitting principal. Carried and exposed by the
    /// engine; enforcement of who may use which owner id is external.
    pub owner_id: Option<String>,
    /// 0-100, non-decreasing while running, forced to 100 on completion.
    pub progress: i64,
    /// Handler-defined document: input parameters, running counters, and
    /// the opaque `checkpoint` sub-field used for resumption.
    pub metadata: serde_json::Value,
    /// Accumulated output, present once units have produced partial
    /// results or the job reached terminal success.
    pub result_data: Option<serde_json::Value>,
    /// Present only when `status` is `failed`.
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl Job {
    /// The checkpoint written after the last fully-committed unit of
    /// work, if any. A JSON `null` counts as absent.
    pub fn checkpoint(&self) -> Option<&serde_json::Value> {
        self.metadata.get("checkpoint").filter(|v| !v.is_null())
    }
}

/// DTO for submitting a new job via `POST /api/v1/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJob {
    pub job_type: String,
    /// Handler-defined input parameters. Defaults to an empty object.
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_metadata() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by status (e.g. `running`, `failed`).
    pub status: Option<JobStatus>,
    /// Filter by job type tag (e.g. `generate`).
    pub job_type: Option<String>,
    /// Filter by owner. An `X-Owner-Id` header takes precedence; this
    /// parameter serves unscoped dashboard-style queries.
    pub owner_id: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
