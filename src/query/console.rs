//! Query console with policy gate, deadline and history.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use super::{QueryErrorKind, QueryPolicy, QueryResponse};
use crate::config::ConsoleConfig;
use crate::db::DatabaseClient;
use crate::error::IntakeError;
use crate::persistence::{history, QueryStatus, RecordQueryParams};
use crate::safety::classify_sql;

/// Extra wait past the deadline before giving up on a client that ignores it.
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

/// Runs operator queries. Never returns an error; failures live in the response.
pub struct QueryConsole {
    db: Arc<dyn DatabaseClient>,
    policy: QueryPolicy,
    timeout: Duration,
    history: Option<SqlitePool>,
}

impl QueryConsole {
    /// Creates a console over `db` using the configured policy and deadline.
    pub fn new(db: Arc<dyn DatabaseClient>, config: &ConsoleConfig) -> Self {
        Self {
            db,
            policy: config.policy,
            timeout: config.timeout(),
            history: None,
        }
    }

    /// Records every run in the query history of the given state database.
    pub fn with_history(mut self, pool: SqlitePool) -> Self {
        self.history = Some(pool);
        self
    }

    /// Overrides the per-query deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Runs `text` verbatim on behalf of `principal`.
    pub async fn run(&self, principal: &str, text: &str) -> QueryResponse {
        if text.trim().is_empty() {
            return QueryResponse::failure(QueryErrorKind::EmptyQuery, "query text is empty");
        }

        let classification = classify_sql(text);
        debug!(
            "Console query classified as {} ({})",
            classification.statement_type, classification.level
        );

        if let Err(reason) = self.policy.check(&classification) {
            warn!("Rejected query from {principal} under {} policy", self.policy);
            let response = QueryResponse::failure(QueryErrorKind::Rejected, reason);
            self.record(principal, text, &response, Duration::ZERO).await;
            return response;
        }

        let start = Instant::now();
        let within = self.db.execute_query_within(text, self.timeout);
        let backstop = self.timeout.saturating_add(DEADLINE_GRACE);
        let response = match tokio::time::timeout(backstop, within).await {
            Ok(Ok(result)) => {
                if let Some(warning) = result.truncation_warning() {
                    warn!("{warning}");
                }
                QueryResponse::from(result)
            }
            Ok(Err(IntakeError::QueryTimeout(reason))) => {
                warn!("Query from {principal} exceeded {:?}: {reason}", self.timeout);
                self.timeout_failure()
            }
            Ok(Err(e)) => QueryResponse::failure(QueryErrorKind::Execution, engine_message(e)),
            Err(_) => {
                warn!("Query from {principal} did not stop within {:?}", self.timeout);
                self.timeout_failure()
            }
        };
        let elapsed = start.elapsed();

        info!(
            "Console query by {principal}: {} in {:?}",
            if response.is_success() { "ok" } else { "failed" },
            elapsed
        );

        self.record(principal, text, &response, elapsed).await;
        response
    }

    fn timeout_failure(&self) -> QueryResponse {
        QueryResponse::failure(
            QueryErrorKind::Timeout,
            format!("Query timed out after {} ms", self.timeout.as_millis()),
        )
    }

    async fn record(&self, principal: &str, sql: &str, response: &QueryResponse, elapsed: Duration) {
        let Some(pool) = &self.history else {
            return;
        };

        let status = match response.error.as_ref().map(|f| f.kind) {
            None => QueryStatus::Success,
            Some(QueryErrorKind::Rejected) => QueryStatus::Rejected,
            Some(QueryErrorKind::Timeout) => QueryStatus::Timeout,
            Some(QueryErrorKind::Execution) | Some(QueryErrorKind::EmptyQuery) => {
                QueryStatus::Error
            }
        };

        let params = RecordQueryParams {
            principal: principal.to_string(),
            sql: sql.to_string(),
            status,
            execution_time_ms: Some(elapsed.as_millis() as i64),
            row_count: response.is_success().then_some(response.row_count as i64),
            error_message: response.error.as_ref().map(|f| f.message.clone()),
        };

        if let Err(e) = history::record_query(pool, &params).await {
            warn!("Failed to record query history: {e}");
        }
    }
}

/// Keeps the engine's own wording for query errors.
fn engine_message(error: IntakeError) -> String {
    match error {
        IntakeError::Query(message) => message,
        other => other.to_string(),
    }
}
