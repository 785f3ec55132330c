//! Database abstraction layer for the query console.
//!
//! Provides a trait-based interface so the console can run against the real
//! SQLite store or a test double.

mod mock;
mod sqlite;
mod types;

pub use mock::MockDatabaseClient;
pub use sqlite::{SqliteClient, DEFAULT_MAX_ROWS};
pub use types::{unique_column_names, QueryResult, Record, Value};

use crate::error::{IntakeError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Trait defining the interface for database clients.
///
/// All database operations are async and return Results with IntakeError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL query and returns the results.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Executes a SQL query that must finish within `timeout`.
    ///
    /// Returns `IntakeError::QueryTimeout` once the deadline passes. The
    /// default only stops waiting; clients that can interrupt the engine
    /// override it so the statement stops too.
    async fn execute_query_within(&self, sql: &str, timeout: Duration) -> Result<QueryResult> {
        match tokio::time::timeout(timeout, self.execute_query(sql)).await {
            Ok(result) => result,
            Err(_) => Err(IntakeError::query_timeout(format!(
                "no answer after {} ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Executes a multi-statement script, discarding any rows.
    ///
    /// Returns the number of rows affected.
    async fn execute_script(&self, sql: &str) -> Result<u64>;

    /// Closes the database connection.
    async fn close(&self) -> Result<()>;
}
