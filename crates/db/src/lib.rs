//! SQLite persistence layer for corral.
//!
//! Owns pool construction, schema migrations, and the repositories.
//! The jobs table is the single source of truth for job execution
//! state; everything else in the workspace reads and writes through
//! [`repositories::JobRepo`].

pub mod migrations;
pub mod models;
pub mod repositories;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;

pub type DbPool = sqlx::SqlitePool;

/// Create a connection pool from a database URL.
///
/// Uses WAL journaling and creates the database file if missing.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Create an in-memory pool with migrations applied.
///
/// A single connection keeps every handle on the same in-memory
/// database. Intended for integration tests.
pub async fn create_test_pool() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply all pending migrations in order.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (idx, sql) in migrations::MIGRATIONS.iter().enumerate() {
        sqlx::query(sql).execute(pool).await.map_err(|e| {
            tracing::error!(migration = idx, error = %e, "Migration failed");
            e
        })?;
    }
    Ok(())
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
