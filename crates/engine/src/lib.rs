//! The corral execution engine: a bounded pool of workers that claims
//! pending jobs, drives their task handlers one unit of work at a time,
//! commits checkpoints and progress durably, and publishes snapshots to
//! stream subscribers.
//!
//! Business logic lives in [`registry::TaskHandler`] implementations
//! owned by callers; the engine only schedules, checkpoints, retries,
//! and reports.

pub mod publisher;
pub mod recovery;
pub mod registry;
pub mod retention;
pub mod worker;

pub use publisher::{JobStreamEvent, ProgressPublisher};
pub use registry::{HandlerRegistry, JobView, TaskHandler, UnitError, UnitOutcome};
pub use worker::{EngineConfig, WorkerPool};
