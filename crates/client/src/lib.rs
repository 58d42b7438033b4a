//! Client library for the corral job engine.
//!
//! Wraps the HTTP API behind the [`JobApi`] trait, parses the SSE
//! progress stream, and tracks the locally active job across process
//! restarts via [`JobTracker`].

pub mod api;
pub mod http;
pub mod sse;
pub mod store;
pub mod tracker;

pub use api::{ApiError, JobApi, JobSnapshot, JobState, StreamMessage};
pub use http::HttpJobApi;
pub use store::ActiveJobStore;
pub use tracker::{JobTracker, Reattach};
