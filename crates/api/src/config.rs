use std::time::Duration;

use corral_engine::EngineConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Maximum number of jobs executing concurrently (default: `4`).
    pub worker_concurrency: usize,
    /// Dispatcher polling interval in milliseconds (default: `500`).
    pub poll_interval_ms: u64,
    /// Window within which an equivalent re-submission returns the
    /// existing job instead of creating a new one (default: `5`).
    pub dedup_window_secs: u64,
    /// Terminal jobs older than this are purged (default: `168`, one week).
    pub retention_max_age_hours: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `WORKER_CONCURRENCY`      | `4`                        |
    /// | `POLL_INTERVAL_MS`        | `500`                      |
    /// | `DEDUP_WINDOW_SECS`       | `5`                        |
    /// | `RETENTION_MAX_AGE_HOURS` | `168`                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let worker_concurrency: usize = std::env::var("WORKER_CONCURRENCY")
            .unwrap_or_else(|_| "4".into())
            .parse()
            .expect("WORKER_CONCURRENCY must be a valid usize");

        let poll_interval_ms: u64 = std::env::var("POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("POLL_INTERVAL_MS must be a valid u64");

        let dedup_window_secs: u64 = std::env::var("DEDUP_WINDOW_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("DEDUP_WINDOW_SECS must be a valid u64");

        let retention_max_age_hours: i64 = std::env::var("RETENTION_MAX_AGE_HOURS")
            .unwrap_or_else(|_| "168".into())
            .parse()
            .expect("RETENTION_MAX_AGE_HOURS must be a valid i64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            worker_concurrency,
            poll_interval_ms,
            dedup_window_secs,
            retention_max_age_hours,
        }
    }

    /// Engine parameters derived from the server configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            concurrency: self.worker_concurrency,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..Default::default()
        }
    }

    /// Deduplication window as a [`Duration`].
    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}
