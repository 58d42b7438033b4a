use std::sync::Arc;

use corral_engine::{HandlerRegistry, ProgressPublisher};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: corral_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Registered job handlers, used to validate submissions.
    pub registry: Arc<HandlerRegistry>,
    /// Broadcast source for job progress streams.
    pub publisher: ProgressPublisher,
}
