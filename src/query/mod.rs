//! Ad-hoc query console.
//!
//! Runs operator SQL against the console database and folds every outcome,
//! including engine errors and deadline expiry, into a `QueryResponse`.

mod console;

pub use console::QueryConsole;

use crate::db::{QueryResult, Record};
use crate::safety::ClassificationResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which statements the console accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPolicy {
    /// Any statement runs as submitted.
    #[default]
    Unrestricted,
    /// Only statements classified as read-only run.
    ReadOnly,
    /// Every query is rejected.
    Disabled,
}

impl QueryPolicy {
    /// Returns `Err(reason)` if the policy forbids a statement with this classification.
    pub fn check(&self, classification: &ClassificationResult) -> Result<(), String> {
        match self {
            Self::Unrestricted => Ok(()),
            Self::Disabled => Err("query console is disabled".to_string()),
            Self::ReadOnly if classification.level.is_read_only() => Ok(()),
            Self::ReadOnly => Err(match &classification.warning {
                Some(warning) => format!("only read-only statements are allowed: {warning}"),
                None => format!(
                    "only read-only statements are allowed, got {} ({})",
                    classification.statement_type, classification.level
                ),
            }),
        }
    }
}

impl fmt::Display for QueryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrestricted => write!(f, "unrestricted"),
            Self::ReadOnly => write!(f, "read_only"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Why a query produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    EmptyQuery,
    Rejected,
    Execution,
    Timeout,
}

/// A query-level failure. Never an `Err` at the API boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub kind: QueryErrorKind,
    /// Engine message verbatim for execution errors.
    pub message: String,
}

impl QueryFailure {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Uniform envelope returned for every console query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    pub row_count: usize,
    /// Set when the row cap cut the result short.
    pub truncated: bool,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryFailure>,
}

impl QueryResponse {
    /// Wraps a failure in an otherwise empty response.
    pub fn failure(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: Some(QueryFailure::new(kind, message)),
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<QueryResult> for QueryResponse {
    fn from(result: QueryResult) -> Self {
        Self {
            execution_time_ms: result.execution_time.as_millis() as u64,
            row_count: result.row_count,
            truncated: result.was_truncated,
            columns: result.columns,
            rows: result.rows,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety::classify_sql;

    #[test]
    fn test_unrestricted_allows_everything() {
        let policy = QueryPolicy::default();
        assert_eq!(policy, QueryPolicy::Unrestricted);
        assert!(policy.check(&classify_sql("DROP TABLE users")).is_ok());
        assert!(policy.check(&classify_sql("not valid syntax")).is_ok());
    }

    #[test]
    fn test_read_only_policy() {
        let policy = QueryPolicy::ReadOnly;
        assert!(policy.check(&classify_sql("SELECT * FROM users")).is_ok());

        let reason = policy.check(&classify_sql("DELETE FROM users")).unwrap_err();
        assert!(reason.contains("DELETE"), "got: {reason}");

        let reason = policy.check(&classify_sql("not valid syntax")).unwrap_err();
        assert!(reason.contains("Could not parse"), "got: {reason}");
    }

    #[test]
    fn test_disabled_rejects_everything() {
        let policy = QueryPolicy::Disabled;
        assert!(policy.check(&classify_sql("SELECT 1")).is_err());
    }

    #[test]
    fn test_policy_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: QueryPolicy,
        }
        let w: Wrapper = toml::from_str(r#"policy = "read_only""#).unwrap();
        assert_eq!(w.policy, QueryPolicy::ReadOnly);
    }

    #[test]
    fn test_failure_envelope_serialization() {
        let response = QueryResponse::failure(QueryErrorKind::EmptyQuery, "query is empty");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"]["kind"], "empty_query");
        assert_eq!(json["rows"], serde_json::json!([]));
        assert!(!response.is_success());

        let ok = serde_json::to_value(QueryResponse::default()).unwrap();
        assert!(ok.get("error").is_none());
    }
}
