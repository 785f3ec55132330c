//! Forward-only schema migrations for the state database.
//!
//! The applied version lives in SQLite's `user_version` header field. Each
//! migration runs in one transaction together with the version bump, so a
//! crash mid-migration leaves the previous version intact.

use crate::error::{IntakeError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "artifact index and query history",
    sql: r#"
        CREATE TABLE artifacts (
            id TEXT PRIMARY KEY,
            original_name TEXT NOT NULL,
            stored_path TEXT NOT NULL UNIQUE,
            size_bytes INTEGER NOT NULL CHECK (size_bytes > 0),
            category TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            received_at TEXT NOT NULL
        );
        CREATE INDEX idx_artifacts_received ON artifacts(received_at);

        CREATE TABLE query_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            principal TEXT NOT NULL,
            sql TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('success', 'error', 'rejected', 'timeout')),
            execution_time_ms INTEGER,
            row_count INTEGER,
            error_message TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX idx_query_history_principal ON query_history(principal, id);
        CREATE INDEX idx_query_history_created ON query_history(created_at);
    "#,
}];

/// Schema version this build writes.
pub const CURRENT_VERSION: i64 = 1;

/// Brings the schema up to [`CURRENT_VERSION`].
///
/// Refuses to touch a database written by a newer build.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current = schema_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(IntakeError::persistence(format!(
            "State database schema v{current} is newer than this build supports (v{CURRENT_VERSION})"
        )));
    }

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(pool, migration).await?;
        info!(
            "Applied state migration v{} ({})",
            migration.version, migration.name
        );
    }

    Ok(())
}

/// Reads the applied schema version; a fresh database reports 0.
pub async fn schema_version(pool: &SqlitePool) -> Result<i64> {
    let (version,): (i64,) = sqlx::query_as("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(|e| IntakeError::persistence(format!("Failed to read schema version: {e}")))?;
    Ok(version)
}

async fn apply(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let failed = |e: sqlx::Error| {
        IntakeError::persistence(format!(
            "State migration v{} failed: {e}",
            migration.version
        ))
    };

    let mut tx = pool.begin().await.map_err(failed)?;
    sqlx::raw_sql(migration.sql)
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    // PRAGMA takes no bind parameters; the version is a compile-time integer.
    sqlx::raw_sql(&format!("PRAGMA user_version = {}", migration.version))
        .execute(&mut *tx)
        .await
        .map_err(failed)?;
    tx.commit().await.map_err(failed)
}
