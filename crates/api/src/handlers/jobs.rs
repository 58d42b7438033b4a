//! Handlers for the `/jobs` resource.
//!
//! Caller identity arrives via the `X-Owner-Id` header ([`Owner`]);
//! jobs with an owner are only visible to that owner, ownerless jobs
//! are visible to everyone.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use tokio::sync::broadcast;

use corral_core::error::CoreError;
use corral_core::job_events::{MSG_TYPE_COMPLETE, MSG_TYPE_ERROR};
use corral_core::types::DbId;
use corral_db::models::job::{Job, JobListQuery, SubmitJob};
use corral_db::models::status::JobStatus;
use corral_db::repositories::JobRepo;
use corral_engine::publisher::{connected_payload, snapshot_payload};

use crate::error::{AppError, AppResult};
use crate::middleware::owner::Owner;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a job by ID and verify the caller may access it.
///
/// Returns `NotFound` if the job does not exist, `Forbidden` if the job
/// has an owner and the caller is someone else. `action` is used in the
/// error message (e.g. "view", "cancel", "delete").
async fn find_and_authorize(
    pool: &corral_db::DbPool,
    job_id: DbId,
    owner: &Owner,
    action: &str,
) -> AppResult<Job> {
    let job = JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    if let Some(job_owner) = job.owner_id.as_deref() {
        if owner.as_deref() != Some(job_owner) {
            return Err(AppError::Core(CoreError::Forbidden(format!(
                "Cannot {action} another owner's job"
            ))));
        }
    }

    Ok(job)
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a new job. Returns 201 with the created record, which starts
/// in `pending` status and is picked up by the worker pool. If an
/// equivalent job (same type, same owner, still pending or running) was
/// submitted within the dedup window, returns 200 with the existing
/// record instead of creating a duplicate.
pub async fn submit_job(
    owner: Owner,
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<Response> {
    if input.job_type.trim().is_empty() {
        return Err(AppError::BadRequest("job_type must not be empty".into()));
    }
    if !state.registry.contains(&input.job_type) {
        return Err(AppError::BadRequest(format!(
            "Unknown job type '{}'",
            input.job_type
        )));
    }

    if let Some(existing) = JobRepo::find_recent_duplicate(
        &state.pool,
        &input.job_type,
        owner.as_deref(),
        state.config.dedup_window(),
    )
    .await?
    {
        tracing::info!(
            job_id = existing.id,
            job_type = %existing.job_type,
            "Duplicate submission, returning existing job",
        );
        return Ok((StatusCode::OK, Json(DataResponse { data: existing })).into_response());
    }

    let job = JobRepo::create(&state.pool, &input, owner.as_deref()).await?;

    tracing::info!(
        job_id = job.id,
        job_type = %job.job_type,
        owner = owner.as_deref().unwrap_or("-"),
        "Job submitted",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })).into_response())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// List jobs. With an `X-Owner-Id` header, only that owner's jobs are
/// returned; without one, all jobs, optionally narrowed by an
/// `owner_id` query parameter. Supports optional `status`, `job_type`,
/// `limit`, and `offset` query parameters.
pub async fn list_jobs(
    owner: Owner,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    // The header scopes the caller; the query parameter only filters
    // unscoped requests.
    let scope = owner.as_deref().or(params.owner_id.as_deref());
    let jobs = JobRepo::list(&state.pool, scope, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Get a single job by ID.
pub async fn get_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, job_id, &owner, "view").await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Request cancellation of a job. Idempotent: always returns 200 with
/// the current record, whether the call flipped the status or the job
/// was already terminal. A running job stops at its next unit boundary,
/// keeping the progress and partial results committed so far.
pub async fn cancel_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, job_id, &owner, "cancel").await?;
    let was_pending = job.status == JobStatus::Pending;

    let cancelled = JobRepo::cancel(&state.pool, job_id).await?;

    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;

    if cancelled {
        tracing::info!(job_id, "Job cancelled");
        // A pending job has no worker to announce the terminal state.
        if was_pending {
            state.publisher.complete(&job);
        }
    }

    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Remove a job record. A pending or running job is cancelled first so
/// its worker stops at the next unit boundary, and a final `complete`
/// snapshot is published so open streams terminate instead of waiting
/// on a row that no longer exists. Returns 204.
pub async fn delete_job(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_and_authorize(&state.pool, job_id, &owner, "delete").await?;
    let was_active = !job.status.is_terminal();

    JobRepo::cancel(&state.pool, job_id).await?;
    if was_active {
        if let Some(job) = JobRepo::find_by_id(&state.pool, job_id).await? {
            state.publisher.complete(&job);
        }
    }
    JobRepo::delete(&state.pool, job_id).await?;

    tracing::info!(job_id, "Job deleted");

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Progress stream
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/stream
///
/// Server-sent events stream for one job. The first event is a
/// `connected` snapshot of the current record. For a job that is
/// already terminal a final `complete` snapshot follows immediately and
/// the stream closes. Otherwise every subsequent progress commit is
/// forwarded as a `progress` snapshot until the terminal `complete`
/// message.
pub async fn stream_job_events(
    owner: Owner,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    // Subscribe before reading the snapshot so no commit between the
    // two is lost.
    let mut rx = state.publisher.subscribe();
    let job = find_and_authorize(&state.pool, job_id, &owner, "watch").await?;

    let stream = async_stream::stream! {
        if let Some(event) = json_event(&connected_payload(&job)) {
            yield Ok(event);
        }

        if job.status.is_terminal() {
            if let Some(event) = json_event(&snapshot_payload(MSG_TYPE_COMPLETE, &job)) {
                yield Ok(event);
            }
            return;
        }

        loop {
            match rx.recv().await {
                Ok(event) if event.job_id == job_id => {
                    // Both the terminal snapshot and a stream-level
                    // error (job row gone) end the subscription.
                    let is_terminal = event.payload["type"] == MSG_TYPE_COMPLETE
                        || event.payload["type"] == MSG_TYPE_ERROR;
                    if let Some(event) = json_event(&event.payload) {
                        yield Ok(event);
                    }
                    if is_terminal {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Snapshots are self-contained, so a lagged receiver
                    // just picks up at the next one.
                    tracing::warn!(job_id, skipped, "Progress stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Serialize a payload into an SSE event, logging and skipping on failure.
fn json_event(payload: &serde_json::Value) -> Option<Event> {
    match Event::default().json_data(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize stream event");
            None
        }
    }
}
