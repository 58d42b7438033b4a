//! Tracks the locally active job across process restarts.
//!
//! The tracker persists the id of the job it watches and, on startup,
//! reattaches: fetch first to learn the current state, then subscribe
//! only if the job is still live. A job that vanished, changed owner,
//! or already finished clears the persisted id so the client does not
//! keep chasing it.

use futures::stream::BoxStream;
use futures::StreamExt;

use corral_core::types::DbId;

use crate::api::{ApiError, JobApi, JobSnapshot, StreamMessage};
use crate::store::ActiveJobStore;

/// Outcome of a reattach attempt.
#[derive(Debug)]
pub enum Reattach {
    /// Nothing was persisted; the client starts idle.
    NoActiveJob,
    /// The persisted job is gone or inaccessible; the id was cleared.
    Cleared { job_id: DbId },
    /// The job finished while the client was away. The id was cleared;
    /// the snapshot carries the final result or error.
    Finished(JobSnapshot),
    /// The job is still live; follow up with [`JobTracker::watch`].
    Watching(JobSnapshot),
}

/// Client-side companion to one active job.
pub struct JobTracker<A: JobApi> {
    api: A,
    store: ActiveJobStore,
}

impl<A: JobApi> JobTracker<A> {
    pub fn new(api: A, store: ActiveJobStore) -> Self {
        Self { api, store }
    }

    /// Record `job_id` as the active job, replacing any previous one.
    pub fn track(&self, job_id: DbId) -> std::io::Result<()> {
        self.store.save(job_id)
    }

    /// Reattach to the persisted job, if any.
    ///
    /// Fetches the current record before subscribing so a job that
    /// reached a terminal state while the client was away is reported
    /// from the snapshot rather than waiting on a stream that will
    /// never speak. Transport errors leave the persisted id in place
    /// for the next attempt.
    pub async fn reattach(&self) -> Result<Reattach, ApiError> {
        let Some(job_id) = self.store.load() else {
            return Ok(Reattach::NoActiveJob);
        };

        match self.api.fetch(job_id).await {
            Ok(job) if job.status.is_terminal() => {
                self.forget();
                Ok(Reattach::Finished(job))
            }
            Ok(job) => Ok(Reattach::Watching(job)),
            Err(ApiError::NotFound(_)) | Err(ApiError::Forbidden(_)) => {
                tracing::info!(job_id, "Persisted job is gone, clearing");
                self.forget();
                Ok(Reattach::Cleared { job_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Open the progress stream for a live job. The persisted id is
    /// cleared when the terminal `complete` message arrives and the
    /// stream ends.
    pub async fn watch(
        &self,
        job_id: DbId,
    ) -> Result<BoxStream<'static, Result<StreamMessage, ApiError>>, ApiError> {
        let mut inner = self.api.subscribe(job_id).await?;
        let store = self.store.clone();

        Ok(Box::pin(async_stream::stream! {
            while let Some(item) = inner.next().await {
                match item {
                    Ok(message) => {
                        let is_complete = message.msg_type == "complete";
                        yield Ok(message);
                        if is_complete {
                            if let Err(e) = store.clear() {
                                tracing::warn!(job_id, error = %e, "Failed to clear active job");
                            }
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }))
    }

    /// Cancel the active job on the server. The id stays persisted
    /// until the stream delivers the terminal message.
    pub async fn cancel(&self, job_id: DbId) -> Result<JobSnapshot, ApiError> {
        self.api.cancel(job_id).await
    }

    /// Delete the job on the server and drop the persisted id.
    pub async fn delete(&self, job_id: DbId) -> Result<(), ApiError> {
        self.api.delete(job_id).await?;
        self.forget();
        Ok(())
    }

    fn forget(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear active job");
        }
    }
}
