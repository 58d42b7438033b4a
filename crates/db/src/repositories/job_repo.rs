//! Repository for the `jobs` table — the durable Job Store.
//!
//! Every mutation is atomic with respect to the stored row, and all
//! terminal-state guards live in the SQL itself (`WHERE status NOT IN
//! (...)`), so a lost race shows up as `rows_affected() == 0` rather
//! than a corrupt transition. Progress merges preserve metadata fields
//! the caller did not touch, notably the resumption checkpoint.

use chrono::Utc;
use serde_json::Value;

use corral_core::types::{DbId, Timestamp};

use crate::models::job::{Job, JobListQuery, SubmitJob};
use crate::models::status::JobStatus;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, job_type, status, owner_id, progress, metadata, result_data, \
    error_message, created_at, updated_at, completed_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD and state-transition operations for jobs.
pub struct JobRepo;

impl JobRepo {
    /// Create a new pending job and return the row.
    pub async fn create(
        pool: &DbPool,
        input: &SubmitJob,
        owner_id: Option<&str>,
    ) -> Result<Job, sqlx::Error> {
        let now = Utc::now();
        let query = format!(
            "INSERT INTO jobs (job_type, status, owner_id, metadata, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.job_type)
            .bind(JobStatus::Pending)
            .bind(owner_id)
            .bind(&input.metadata)
            .bind(now)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an equivalent non-terminal job created within the trailing
    /// dedup window, if one exists.
    ///
    /// Equivalence is (job_type, owner_id). This guards against
    /// duplicate client submissions (e.g. a double form submit) without
    /// requiring idempotency keys.
    pub async fn find_recent_duplicate(
        pool: &DbPool,
        job_type: &str,
        owner_id: Option<&str>,
        window: std::time::Duration,
    ) -> Result<Option<Job>, sqlx::Error> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::seconds(5));
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE job_type = ? AND owner_id IS ? \
               AND status IN (?, ?) \
               AND created_at > ? \
             ORDER BY created_at DESC, id DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_type)
            .bind(owner_id)
            .bind(JobStatus::Pending)
            .bind(JobStatus::Running)
            .bind(cutoff)
            .fetch_optional(pool)
            .await
    }

    /// Atomically claim the oldest pending job, transitioning it to
    /// `running`.
    ///
    /// SQLite's single-writer model makes the nested-select update
    /// atomic, so two dispatch cycles can never claim the same job.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = ?, updated_at = ? \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = ? \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
             ) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running)
            .bind(Utc::now())
            .bind(JobStatus::Pending)
            .fetch_optional(pool)
            .await
    }

    /// Update progress and merge a metadata patch into the stored
    /// metadata, preserving fields the patch does not touch.
    ///
    /// Progress is clamped to be non-decreasing and at most 100. Only
    /// applies while the job is `running`; returns `false` otherwise.
    pub async fn update_progress(
        pool: &DbPool,
        id: DbId,
        progress: i64,
        metadata_patch: &Value,
    ) -> Result<bool, sqlx::Error> {
        Self::commit_unit(pool, id, progress, metadata_patch, None, None).await
    }

    /// Write `metadata.checkpoint` without touching progress or other
    /// metadata fields. Only applies while the job is `running`.
    pub async fn save_checkpoint(
        pool: &DbPool,
        id: DbId,
        checkpoint: &Value,
    ) -> Result<bool, sqlx::Error> {
        Self::commit_unit(pool, id, 0, &Value::Object(Default::default()), Some(checkpoint), None)
            .await
    }

    /// Commit the outcome of one unit of work in a single transaction:
    /// merge the counters patch into metadata, advance the checkpoint,
    /// raise progress, and fold the partial result into `result_data`.
    ///
    /// Returns `false` without writing if the job is no longer
    /// `running` (cancelled or otherwise moved on).
    pub async fn commit_unit(
        pool: &DbPool,
        id: DbId,
        progress: i64,
        metadata_patch: &Value,
        checkpoint: Option<&Value>,
        partial_result: Option<&Value>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let row: Option<(JobStatus, Value, Option<Value>, i64)> = sqlx::query_as(
            "SELECT status, metadata, result_data, progress FROM jobs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, mut metadata, result_data, current_progress)) = row else {
            return Ok(false);
        };
        if status != JobStatus::Running {
            return Ok(false);
        }

        merge_object(&mut metadata, metadata_patch);
        if let Some(cp) = checkpoint {
            if let Some(map) = metadata.as_object_mut() {
                map.insert("checkpoint".to_string(), cp.clone());
            }
        }

        let new_progress = progress.clamp(0, 100).max(current_progress);

        let new_result = match partial_result {
            Some(partial) => Some(fold_partial(result_data, partial)),
            None => result_data,
        };

        sqlx::query(
            "UPDATE jobs \
             SET progress = ?, metadata = ?, result_data = ?, updated_at = ? \
             WHERE id = ? AND status = ?",
        )
        .bind(new_progress)
        .bind(&metadata)
        .bind(new_result.as_ref())
        .bind(Utc::now())
        .bind(id)
        .bind(JobStatus::Running)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Mark a job as completed, forcing progress to 100.
    ///
    /// When `final_result` is given it replaces the accumulated
    /// `result_data` (e.g. with a truncated summary); otherwise the
    /// accumulated partial results stand. Returns `false` if the job
    /// was already terminal.
    pub async fn complete(
        pool: &DbPool,
        id: DbId,
        final_result: Option<&Value>,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, progress = 100, \
                 result_data = COALESCE(?, result_data), \
                 completed_at = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN (?, ?, ?)",
        )
        .bind(JobStatus::Completed)
        .bind(final_result)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(JobStatus::Completed)
        .bind(JobStatus::Failed)
        .bind(JobStatus::Cancelled)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a job as failed with an error message.
    ///
    /// Partial results and metadata accumulated up to the last committed
    /// unit are left untouched, so no completed work is lost.
    pub async fn fail(pool: &DbPool, id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, error_message = ?, completed_at = ?, updated_at = ? \
             WHERE id = ? AND status NOT IN (?, ?, ?)",
        )
        .bind(JobStatus::Failed)
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(JobStatus::Completed)
        .bind(JobStatus::Failed)
        .bind(JobStatus::Cancelled)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cancel a job if it is not already in a terminal state.
    ///
    /// Cancellation carries no error message; a running worker observes
    /// the new status at its next unit boundary and stops. Returns
    /// `false` if the job was already terminal.
    pub async fn cancel(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = ?, completed_at = ?, updated_at = ? \
             WHERE id = ? AND status IN (?, ?)",
        )
        .bind(JobStatus::Cancelled)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(JobStatus::Pending)
        .bind(JobStatus::Running)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// List jobs with optional owner scoping and status/type filters.
    pub async fn list(
        pool: &DbPool,
        owner_id: Option<&str>,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = params.offset.unwrap_or(0).max(0);

        let mut conditions: Vec<&str> = Vec::new();
        if owner_id.is_some() {
            conditions.push("owner_id = ?");
        }
        if params.status.is_some() {
            conditions.push("status = ?");
        }
        if params.job_type.is_some() {
            conditions.push("job_type = ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             {where_clause} \
             ORDER BY created_at DESC, id DESC \
             LIMIT ? OFFSET ?"
        );

        let mut q = sqlx::query_as::<_, Job>(&query);
        if let Some(owner) = owner_id {
            q = q.bind(owner.to_string());
        }
        if let Some(status) = params.status {
            q = q.bind(status);
        }
        if let Some(job_type) = &params.job_type {
            q = q.bind(job_type.clone());
        }
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// All jobs currently marked `running`. Input to the startup
    /// recovery sweep.
    pub async fn list_running(pool: &DbPool) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = ? ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running)
            .fetch_all(pool)
            .await
    }

    /// Delete a job row. Returns `false` if no such job existed.
    pub async fn delete(pool: &DbPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete terminal jobs that completed before `cutoff`. Returns the
    /// number of rows removed.
    pub async fn delete_terminal_older_than(
        pool: &DbPool,
        cutoff: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM jobs \
             WHERE status IN (?, ?, ?) AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(JobStatus::Completed)
        .bind(JobStatus::Failed)
        .bind(JobStatus::Cancelled)
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Shallow-merge `patch` into `target`. Both are expected to be JSON
/// objects; a non-object patch is ignored.
fn merge_object(target: &mut Value, patch: &Value) {
    let Some(patch_map) = patch.as_object() else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    let map = target.as_object_mut().expect("target coerced to object");
    for (key, value) in patch_map {
        map.insert(key.clone(), value.clone());
    }
}

/// Fold a unit's partial result into the accumulated `result_data`
/// array. Array partials are flattened; scalar/object partials are
/// appended as single elements.
fn fold_partial(existing: Option<Value>, partial: &Value) -> Value {
    let mut items = match existing {
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
        None => Vec::new(),
    };
    match partial {
        Value::Array(new_items) => items.extend(new_items.iter().cloned()),
        other => items.push(other.clone()),
    }
    Value::Array(items)
}
