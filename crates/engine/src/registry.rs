//! Task handler interface and type registry.
//!
//! A handler knows how to execute one kind of job (`generate`,
//! `verify`, `scrape`, `import`, ...) as a sequence of units of work,
//! each of which commits a checkpoint. Handlers are registered by the
//! embedding application; the engine never hardcodes job types.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use corral_core::types::DbId;
use corral_db::models::job::Job;

/// Read-only view of a job passed to handlers.
///
/// Handlers see identity and input metadata but never mutate the row
/// themselves; all writes go through the worker's unit commit.
#[derive(Debug, Clone)]
pub struct JobView {
    pub id: DbId,
    pub job_type: String,
    pub owner_id: Option<String>,
    pub metadata: Value,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            owner_id: job.owner_id.clone(),
            metadata: job.metadata.clone(),
        }
    }
}

/// Result of executing one unit of work.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Checkpoint to persist for this unit. Must be sufficient to
    /// resume from here after a crash.
    pub new_checkpoint: Option<Value>,
    /// Progress contribution of this unit, in percentage points.
    pub progress_delta: i64,
    /// Shallow patch merged into job metadata (running counters).
    pub counters_patch: Value,
    /// Output produced by this unit; folded into `result_data`.
    pub partial_result: Option<Value>,
    /// True when the job has no more units to run.
    pub done: bool,
}

/// Error raised by a handler for a single unit of work.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    /// Network/timeout-class error; the unit is retried with backoff.
    #[error("transient: {0}")]
    Transient(String),

    /// Unrecoverable condition; the job fails immediately with this
    /// message recorded verbatim.
    #[error("{0}")]
    Fatal(String),
}

/// Executes and checkpoints one kind of job.
///
/// Implementations must be idempotent with respect to the checkpoint:
/// re-invoking with the same checkpoint after a crash must not
/// double-count or duplicate output.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the next unit of work after `checkpoint` (`None` means
    /// start from the beginning).
    async fn execute_unit(
        &self,
        job: &JobView,
        checkpoint: Option<&Value>,
    ) -> Result<UnitOutcome, UnitError>;
}

/// Maps job type strings to their handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    /// Look up the handler for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(job_type).cloned()
    }

    /// Whether a handler is registered for `job_type`.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job type names, for diagnostics.
    pub fn types(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        async fn execute_unit(
            &self,
            _job: &JobView,
            _checkpoint: Option<&Value>,
        ) -> Result<UnitOutcome, UnitError> {
            Ok(UnitOutcome {
                new_checkpoint: None,
                progress_delta: 100,
                counters_patch: Value::Object(Default::default()),
                partial_result: None,
                done: true,
            })
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.contains("generate"));

        registry.register("generate", Arc::new(NoopHandler));
        assert!(registry.contains("generate"));
        assert!(registry.get("generate").is_some());
        assert!(registry.get("verify").is_none());
        assert_eq!(registry.types(), vec!["generate"]);
    }
}
