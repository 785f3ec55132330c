//! SQLite client for the query console.
//!
//! Runs operator SQL verbatim against the console database and converts
//! whatever comes back into shape-agnostic records. Deadlines are enforced
//! inside the engine with a progress handler, so an interrupted statement
//! releases its connection instead of running on in the background.

use crate::db::{unique_column_names, DatabaseClient, QueryResult, Record, Value};
use crate::error::{IntakeError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Either, Executor, Row, TypeInfo, ValueRef};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default cap on rows returned from one query.
pub const DEFAULT_MAX_ROWS: usize = 1000;

/// Virtual machine instructions between deadline checks.
const PROGRESS_INTERVAL_OPS: i32 = 1_000;

/// SQLite console database client.
#[derive(Debug, Clone)]
pub struct SqliteClient {
    pool: SqlitePool,
    max_rows: usize,
}

/// Rows of one statement, capped at `max_rows`.
#[derive(Debug)]
struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Record>,
    total_rows: usize,
}

impl ResultSet {
    fn for_row(row: &SqliteRow) -> Self {
        Self {
            columns: unique_column_names(
                row.columns()
                    .iter()
                    .map(|col| col.name().to_string())
                    .collect(),
            ),
            rows: Vec::new(),
            total_rows: 0,
        }
    }
}

/// What a (possibly multi-statement) text produced.
#[derive(Debug, Default)]
struct Collected {
    /// Rows of the last statement that returned any.
    last: Option<ResultSet>,
    statements: usize,
}

impl SqliteClient {
    /// Opens (creating if missing) the console database at `path`.
    pub async fn open(path: &Path, max_rows: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IntakeError::io(format!(
                    "Failed to create console database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| IntakeError::config(format!("Invalid console database path: {e}")))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                IntakeError::query(format!(
                    "Failed to open console database {}: {e}",
                    path.display()
                ))
            })?;

        debug!("Console database opened at {}", path.display());
        Ok(Self::from_pool(pool, max_rows))
    }

    /// Creates a client from an existing connection pool.
    pub fn from_pool(pool: SqlitePool, max_rows: usize) -> Self {
        Self {
            pool,
            max_rows: max_rows.max(1),
        }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| IntakeError::query(format_query_error(e)))
    }

    async fn run_query(&self, sql: &str, timeout: Option<Duration>) -> Result<QueryResult> {
        let start = Instant::now();
        let mut conn = self.acquire().await?;

        let interrupted = Arc::new(AtomicBool::new(false));
        // An unrepresentable deadline means no deadline.
        let deadline = timeout.and_then(|t| start.checked_add(t));
        set_deadline(&mut conn, deadline, interrupted.clone()).await?;

        let outcome = collect_statements(&mut conn, sql, self.max_rows).await;

        let collected = match outcome {
            Ok(collected) => collected,
            Err(e) => {
                clear_deadline(&mut conn).await;
                if interrupted.load(Ordering::Relaxed) {
                    let limit = timeout.unwrap_or_default();
                    warn!("Console statement interrupted after {limit:?}");
                    return Err(IntakeError::query_timeout(format!(
                        "interrupted after {} ms",
                        limit.as_millis()
                    )));
                }
                return Err(IntakeError::query(format_query_error(e)));
            }
        };

        let execution_time = start.elapsed();

        let result = match collected.last {
            Some(set) => {
                if collected.statements > 1 {
                    debug!(
                        "{} statements ran; returning rows of the last one that produced any",
                        collected.statements
                    );
                }
                set
            }
            None => ResultSet {
                // Statement description only makes sense for a single statement.
                columns: if collected.statements <= 1 {
                    unique_column_names(describe_columns(&mut conn, sql).await)
                } else {
                    Vec::new()
                },
                rows: Vec::new(),
                total_rows: 0,
            },
        };
        clear_deadline(&mut conn).await;

        let was_truncated = result.total_rows > result.rows.len();
        if was_truncated {
            warn!(
                "Query returned {} rows, truncating to {} rows",
                result.total_rows, self.max_rows
            );
        }

        Ok(QueryResult {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
            total_rows: result.total_rows,
            was_truncated,
            execution_time,
        })
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.run_query(sql, None).await
    }

    async fn execute_query_within(&self, sql: &str, timeout: Duration) -> Result<QueryResult> {
        self.run_query(sql, Some(timeout)).await
    }

    async fn execute_script(&self, sql: &str) -> Result<u64> {
        let mut conn = self.acquire().await?;
        clear_deadline(&mut conn).await;

        let outcome = (&mut *conn)
            .execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| IntakeError::query(format_query_error(e)))?;
        Ok(outcome.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Streams every statement in `sql`, keeping the rows of the last statement
/// that returned any. Each record is keyed by its own statement's columns.
async fn collect_statements(
    conn: &mut SqliteConnection,
    sql: &str,
    max_rows: usize,
) -> sqlx::Result<Collected> {
    let mut collected = Collected::default();
    let mut current: Option<ResultSet> = None;

    let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_) => {
                collected.statements += 1;
                if let Some(set) = current.take() {
                    collected.last = Some(set);
                }
            }
            Either::Right(row) => {
                let set = current.get_or_insert_with(|| ResultSet::for_row(&row));
                set.total_rows += 1;
                if set.rows.len() < max_rows {
                    set.rows.push(convert_row(&row, &set.columns));
                }
            }
        }
    }
    if let Some(set) = current {
        collected.last = Some(set);
    }

    Ok(collected)
}

/// Installs a progress handler that aborts the running statement once
/// `deadline` passes, or removes any handler when there is no deadline.
async fn set_deadline(
    conn: &mut SqliteConnection,
    deadline: Option<Instant>,
    interrupted: Arc<AtomicBool>,
) -> Result<()> {
    let mut handle = conn
        .lock_handle()
        .await
        .map_err(|e| IntakeError::query(format_query_error(e)))?;

    match deadline {
        Some(deadline) => {
            handle.set_progress_handler(PROGRESS_INTERVAL_OPS, move || {
                if Instant::now() < deadline {
                    return true;
                }
                interrupted.store(true, Ordering::Relaxed);
                false
            });
        }
        None => {
            handle.remove_progress_handler();
        }
    }
    Ok(())
}

/// Removes a deadline left on a pooled connection.
async fn clear_deadline(conn: &mut SqliteConnection) {
    match conn.lock_handle().await {
        Ok(mut handle) => {
            handle.remove_progress_handler();
        }
        Err(e) => warn!("Could not clear statement deadline: {e}"),
    }
}

/// Column names the engine reports for `sql` without producing rows.
async fn describe_columns(conn: &mut SqliteConnection, sql: &str) -> Vec<String> {
    match (&mut *conn).describe(sql).await {
        Ok(description) => description
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect(),
        Err(e) => {
            debug!("Could not describe statement: {e}");
            Vec::new()
        }
    }
}

/// Converts a SqliteRow into a record keyed by the (already unique) column names.
fn convert_row(row: &SqliteRow, columns: &[String]) -> Record {
    (0..row.columns().len())
        .map(|i| {
            let name = columns
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("column_{}", i + 1));
            (name, convert_value(row, i))
        })
        .collect()
}

/// Decodes one cell using the storage class of the value itself.
///
/// SQLite is dynamically typed, so the declared column type says little about
/// what a given cell holds.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<Option<i64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Int)
            .unwrap_or_else(|| fallback_value(row, index)),

        "REAL" | "NUMERIC" => row
            .try_get::<Option<f64>, _>(index)
            .ok()
            .flatten()
            .map(Value::Float)
            .unwrap_or_else(|| fallback_value(row, index)),

        "BLOB" => row
            .try_get::<Option<Vec<u8>>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bytes)
            .unwrap_or(Value::Null),

        _ => fallback_value(row, index),
    }
}

fn fallback_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(index) {
        return Value::String(s);
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .flatten()
        .map(Value::Bytes)
        .unwrap_or(Value::Null)
}

/// Formats a sqlx error into the message shown to the operator.
///
/// Database errors keep the engine's message verbatim.
fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => db_error.message().to_string(),
        None => error.to_string(),
    }
}
