//! Mock database client for testing.
//!
//! Returns canned results, optionally after a delay or with a failure, and
//! records every statement it receives.

use super::{DatabaseClient, QueryResult, Record, Value};
use crate::error::{IntakeError, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    delay: Option<Duration>,
    failure: Option<String>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every query wait `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every query fail with the given engine message.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Statements received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn record(&self, sql: &str) {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sql.to_string());
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(IntakeError::query(message.clone()));
        }

        if sql.trim_start().to_uppercase().starts_with("SELECT") {
            let mut row = Record::new();
            row.insert(
                "result".to_string(),
                Value::String(format!("Mock result for: {sql}")),
            );
            Ok(QueryResult::with_data(vec!["result".to_string()], vec![row])
                .with_execution_time(Duration::from_millis(1)))
        } else {
            Ok(QueryResult::new().with_execution_time(Duration::from_millis(1)))
        }
    }

    async fn execute_script(&self, sql: &str) -> Result<u64> {
        self.record(sql);
        match &self.failure {
            Some(message) => Err(IntakeError::query(message.clone())),
            None => Ok(0),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
