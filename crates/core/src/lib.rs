//! Domain types shared across the corral workspace.
//!
//! This crate has zero internal dependencies so it can be used by the
//! persistence layer, the execution engine, the API, and client tooling
//! alike.

pub mod error;
pub mod job_events;
pub mod retry;
pub mod types;
