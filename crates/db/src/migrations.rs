//! Inline SQL migrations for the corral schema.
//!
//! The schema is small and self-contained, so migrations are plain SQL
//! strings applied in order rather than sqlx migration files.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: jobs table.
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    job_type      TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'pending'
                  CHECK (status IN ('pending', 'running', 'completed', 'failed', 'cancelled')),
    owner_id      TEXT,
    progress      INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
    metadata      TEXT NOT NULL DEFAULT '{}',
    result_data   TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    completed_at  TEXT
);
"#,
    // Migration 2: indexes for the dispatcher claim scan and dashboard filters.
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status, created_at);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id, job_type);"#,
];
