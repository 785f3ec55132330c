//! Query history persistence.
//!
//! Records and retrieves console queries with retention management.

use crate::error::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

const MAX_HISTORY_ENTRIES: i64 = 5000;
const MAX_HISTORY_DAYS: i64 = 90;

/// Outcome of one console query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Success,
    Error,
    Rejected,
    Timeout,
}

impl QueryStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "error" => Self::Error,
            "rejected" => Self::Rejected,
            "timeout" => Self::Timeout,
            _ => Self::Success,
        }
    }
}

/// A query history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub principal: String,
    pub sql: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
    pub created_at: String,
}

/// Raw database row for history entry.
#[derive(Debug, Clone, FromRow)]
struct HistoryEntryRow {
    id: i64,
    principal: String,
    sql: String,
    status: String,
    execution_time_ms: Option<i64>,
    row_count: Option<i64>,
    error_message: Option<String>,
    created_at: String,
}

impl From<HistoryEntryRow> for HistoryEntry {
    fn from(row: HistoryEntryRow) -> Self {
        Self {
            id: row.id,
            principal: row.principal,
            sql: row.sql,
            status: QueryStatus::from_str(&row.status),
            execution_time_ms: row.execution_time_ms,
            row_count: row.row_count,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

/// Parameters for recording one console run.
#[derive(Debug, Clone)]
pub struct RecordQueryParams {
    pub principal: String,
    pub sql: String,
    pub status: QueryStatus,
    pub execution_time_ms: Option<i64>,
    pub row_count: Option<i64>,
    pub error_message: Option<String>,
}

/// Filter options for querying history.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub principal: Option<String>,
    pub text_search: Option<String>,
    pub limit: Option<i64>,
}

/// Records a new query execution in history.
pub async fn record_query(pool: &SqlitePool, params: &RecordQueryParams) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO query_history
        (principal, sql, status, execution_time_ms, row_count, error_message)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&params.principal)
    .bind(&params.sql)
    .bind(params.status.as_str())
    .bind(params.execution_time_ms)
    .bind(params.row_count)
    .bind(params.error_message.as_deref())
    .execute(pool)
    .await
    .map_err(|e| IntakeError::persistence(format!("Failed to record query: {e}")))?;

    let id = result.last_insert_rowid();

    prune_old_entries(pool).await?;

    Ok(id)
}

/// Prunes history entries beyond retention limits.
async fn prune_old_entries(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM query_history
        WHERE created_at < datetime('now', ? || ' days')
        "#,
    )
    .bind(-MAX_HISTORY_DAYS)
    .execute(pool)
    .await
    .map_err(|e| IntakeError::persistence(format!("Failed to prune old entries: {e}")))?;

    sqlx::query(
        r#"
        DELETE FROM query_history
        WHERE id NOT IN (
            SELECT id FROM query_history
            ORDER BY id DESC
            LIMIT ?
        )
        "#,
    )
    .bind(MAX_HISTORY_ENTRIES)
    .execute(pool)
    .await
    .map_err(|e| IntakeError::persistence(format!("Failed to prune excess entries: {e}")))?;

    Ok(())
}

/// Lists history entries, newest first, with optional filters.
pub async fn list_history(pool: &SqlitePool, filter: &HistoryFilter) -> Result<Vec<HistoryEntry>> {
    let mut query = String::from(
        r#"
        SELECT id, principal, sql, status,
               execution_time_ms, row_count, error_message, created_at
        FROM query_history
        WHERE 1=1
        "#,
    );

    if filter.principal.is_some() {
        query.push_str(" AND principal = ?");
    }
    if filter.text_search.is_some() {
        query.push_str(" AND sql LIKE ?");
    }

    query.push_str(" ORDER BY id DESC");

    if filter.limit.is_some() {
        query.push_str(" LIMIT ?");
    }

    let mut sqlx_query = sqlx::query_as::<_, HistoryEntryRow>(&query);

    if let Some(ref principal) = filter.principal {
        sqlx_query = sqlx_query.bind(principal);
    }
    if let Some(ref text) = filter.text_search {
        sqlx_query = sqlx_query.bind(format!("%{}%", text));
    }
    if let Some(limit) = filter.limit {
        sqlx_query = sqlx_query.bind(limit);
    }

    let rows = sqlx_query
        .fetch_all(pool)
        .await
        .map_err(|e| IntakeError::persistence(format!("Failed to list history: {e}")))?;

    Ok(rows.into_iter().map(HistoryEntry::from).collect())
}

/// Returns the count of history entries.
pub async fn count_history(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM query_history")
        .fetch_one(pool)
        .await
        .map_err(|e| IntakeError::persistence(format!("Failed to count history: {e}")))?;

    Ok(count)
}
