//! Persistence layer for the intake pipeline.
//!
//! Manages the local SQLite state database: the artifact index and the
//! console query history.

pub mod artifacts;
pub mod history;
mod migrations;

pub use history::{HistoryEntry, HistoryFilter, QueryStatus, RecordQueryParams};

use crate::error::{IntakeError, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Attempts at opening a database another process holds locked.
const BUSY_ATTEMPTS: u32 = 3;
const BUSY_BACKOFF: Duration = Duration::from_millis(200);

// Primary SQLite result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_CORRUPT: i32 = 11;
const SQLITE_NOTADB: i32 = 26;

/// The state database: artifact index and query history.
#[derive(Debug)]
pub struct StateDb {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl StateDb {
    /// Opens or creates the state database at `path` and migrates it.
    ///
    /// A file that SQLite reports as corrupt or not a database is moved
    /// aside and replaced with an empty one. Stored blobs are left alone,
    /// only their index is lost. Any other failure, including a schema
    /// written by a newer build, is returned untouched.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IntakeError::persistence(format!(
                    "Failed to create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let pool = match connect_checked(path).await {
            Ok(pool) => pool,
            Err(e) if is_corruption(&e) => {
                let moved = quarantine(path)?;
                error!(
                    "State database {} is unreadable ({e}); moved to {} and starting empty",
                    path.display(),
                    moved.display()
                );
                connect_checked(path).await.map_err(|e| {
                    IntakeError::persistence(format!("Failed to recreate state database: {e}"))
                })?
            }
            Err(e) => {
                return Err(IntakeError::persistence(format!(
                    "Failed to open state database {}: {e}",
                    path.display()
                )))
            }
        };

        migrations::run_migrations(&pool).await?;
        info!("State database opened at {}", path.display());

        Ok(Self {
            pool,
            db_path: path.to_path_buf(),
        })
    }

    /// Returns the path to the state database.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connects and reads the schema, retrying only while the file is locked.
async fn connect_checked(path: &Path) -> std::result::Result<SqlitePool, sqlx::Error> {
    let mut attempt = 1;
    loop {
        match try_connect(path).await {
            Err(e) if is_busy(&e) && attempt < BUSY_ATTEMPTS => {
                debug!("State database busy (attempt {attempt}): {e}");
                tokio::time::sleep(BUSY_BACKOFF * attempt).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

async fn try_connect(path: &Path) -> std::result::Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    // Forces a read of the file header and schema, which is where a damaged
    // file first fails.
    sqlx::query("SELECT count(*) FROM sqlite_master")
        .execute(&pool)
        .await?;
    Ok(pool)
}

fn primary_code(error: &sqlx::Error) -> Option<i32> {
    let code = error.as_database_error()?.code()?;
    code.parse::<i32>().ok().map(|c| c & 0xff)
}

fn is_busy(error: &sqlx::Error) -> bool {
    matches!(primary_code(error), Some(SQLITE_BUSY | SQLITE_LOCKED))
}

fn is_corruption(error: &sqlx::Error) -> bool {
    matches!(primary_code(error), Some(SQLITE_CORRUPT | SQLITE_NOTADB))
}

/// Moves a damaged database (and its WAL side files) to a timestamped name.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let target = path.with_extension(format!("db.corrupt-{stamp}"));

    std::fs::rename(path, &target).map_err(|e| {
        IntakeError::persistence(format!(
            "Failed to move damaged state database to {}: {e}",
            target.display()
        ))
    })?;

    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        let side = PathBuf::from(side);
        if side.exists() {
            if let Err(e) = std::fs::remove_file(&side) {
                warn!("Failed to remove {}: {e}", side.display());
            }
        }
    }

    Ok(target)
}
