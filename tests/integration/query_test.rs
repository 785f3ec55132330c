//! Console query tests against a real SQLite console database.

use lab_intake::db::Value;
use lab_intake::error::IntakeError;
use lab_intake::persistence::QueryStatus;
use lab_intake::pipeline::{Pipeline, Principal};
use lab_intake::query::{QueryErrorKind, QueryPolicy};

use super::{operator, test_pipeline, test_pipeline_with};

const SEED: &str = r#"
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL,
    password TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'user'
);
INSERT INTO users (email, password, role) VALUES ('admin@lab.local', 'admin123', 'admin');
INSERT INTO users (email, password) VALUES ('alice@lab.local', 'hunter2');
INSERT INTO users (email, password) VALUES ('bob@lab.local', 'letmein');
"#;

async fn seeded(pipeline: &Pipeline) {
    pipeline.seed_console(Some(&operator()), SEED).await.unwrap();
}

#[tokio::test]
async fn test_select_returns_dynamic_columns() {
    let (pipeline, _dir) = test_pipeline().await;
    seeded(&pipeline).await;

    let response = pipeline
        .query(
            Some(&operator()),
            "SELECT id, email, role FROM users ORDER BY id",
        )
        .await
        .unwrap();

    assert!(response.is_success());
    assert_eq!(response.columns, vec!["id", "email", "role"]);
    assert_eq!(response.row_count, 3);
    assert_eq!(response.rows[0]["email"], Value::from("admin@lab.local"));
    assert_eq!(response.rows[0]["role"], Value::from("admin"));
    assert_eq!(response.rows[2]["id"], Value::Int(3));
}

#[tokio::test]
async fn test_zero_rows_is_not_an_error() {
    let (pipeline, _dir) = test_pipeline().await;
    seeded(&pipeline).await;

    let response = pipeline
        .query(
            Some(&operator()),
            "SELECT email, password FROM users WHERE role = 'nobody'",
        )
        .await
        .unwrap();

    assert!(response.error.is_none());
    assert_eq!(response.columns, vec!["email", "password"]);
    assert!(response.rows.is_empty());
    assert_eq!(response.row_count, 0);
}

#[tokio::test]
async fn test_invalid_syntax_is_folded_into_response() {
    let (pipeline, _dir) = test_pipeline().await;

    let response = pipeline
        .query(Some(&operator()), "not valid syntax")
        .await
        .unwrap();

    let failure = response.error.expect("expected a query failure");
    assert_eq!(failure.kind, QueryErrorKind::Execution);
    assert!(!failure.message.is_empty());
    assert!(response.rows.is_empty());
}

#[tokio::test]
async fn test_empty_query() {
    let (pipeline, _dir) = test_pipeline().await;

    let response = pipeline.query(Some(&operator()), "   ").await.unwrap();
    assert_eq!(response.error.unwrap().kind, QueryErrorKind::EmptyQuery);
}

#[tokio::test]
async fn test_query_without_principal_is_unauthorized() {
    let (pipeline, _dir) = test_pipeline().await;

    let err = pipeline.query(None, "SELECT 1").await.unwrap_err();
    assert!(matches!(err, IntakeError::Unauthorized(_)));
}

#[tokio::test]
async fn test_unrestricted_console_runs_injection_payloads() {
    let (pipeline, _dir) = test_pipeline().await;
    seeded(&pipeline).await;

    let response = pipeline
        .query(
            Some(&operator()),
            "SELECT email FROM users WHERE email = '' OR '1'='1' ORDER BY id",
        )
        .await
        .unwrap();
    assert_eq!(response.row_count, 3);

    let response = pipeline
        .query(Some(&operator()), "UPDATE users SET role = 'admin'")
        .await
        .unwrap();
    assert!(response.is_success());
}

#[tokio::test]
async fn test_read_only_policy_rejects_writes() {
    let (pipeline, _dir) = test_pipeline_with(|c| c.console.policy = QueryPolicy::ReadOnly).await;
    seeded(&pipeline).await;

    let response = pipeline
        .query(Some(&operator()), "DELETE FROM users")
        .await
        .unwrap();
    assert_eq!(response.error.unwrap().kind, QueryErrorKind::Rejected);

    let response = pipeline
        .query(Some(&operator()), "SELECT COUNT(*) AS n FROM users")
        .await
        .unwrap();
    assert_eq!(response.rows[0]["n"], Value::Int(3));
}

#[tokio::test]
async fn test_row_cap_reports_truncation() {
    let (pipeline, _dir) = test_pipeline_with(|c| c.console.max_rows = 2).await;
    seeded(&pipeline).await;

    let response = pipeline
        .query(Some(&operator()), "SELECT * FROM users")
        .await
        .unwrap();

    assert_eq!(response.row_count, 2);
    assert!(response.truncated);
}

#[tokio::test]
async fn test_history_records_outcomes() {
    let (pipeline, _dir) = test_pipeline().await;
    seeded(&pipeline).await;

    pipeline
        .query(Some(&operator()), "SELECT * FROM users")
        .await
        .unwrap();
    pipeline
        .query(Some(&operator()), "SELECT * FROM missing_table")
        .await
        .unwrap();
    pipeline
        .query(Some(&Principal::new("someone-else")), "SELECT 1")
        .await
        .unwrap();

    let history = pipeline.query_history(Some(&operator()), 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, QueryStatus::Error);
    assert!(history[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("no such table"));
    assert_eq!(history[1].status, QueryStatus::Success);
    assert_eq!(history[1].row_count, Some(3));
}

#[tokio::test]
async fn test_runaway_queries_do_not_exhaust_the_console() {
    let (pipeline, _dir) = test_pipeline_with(|c| c.console.timeout_secs = 1).await;
    let runaway = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                   SELECT count(*) FROM c";

    for _ in 0..5 {
        let response = pipeline.query(Some(&operator()), runaway).await.unwrap();
        assert_eq!(response.error.unwrap().kind, QueryErrorKind::Timeout);
    }

    let response = pipeline
        .query(Some(&operator()), "SELECT 1 AS one")
        .await
        .unwrap();
    assert!(response.is_success(), "got: {:?}", response.error);
    assert_eq!(response.rows[0]["one"], Value::Int(1));

    let history = pipeline.query_history(Some(&operator()), 10).await.unwrap();
    assert_eq!(history[0].status, QueryStatus::Success);
    assert_eq!(history[1].status, QueryStatus::Timeout);
}

#[tokio::test]
async fn test_multi_statement_rows_keep_their_own_columns() {
    let (pipeline, _dir) = test_pipeline().await;

    let response = pipeline
        .query(Some(&operator()), "SELECT 1 AS a; SELECT 2 AS b, 3 AS c")
        .await
        .unwrap();

    assert_eq!(response.columns, vec!["b", "c"]);
    assert_eq!(response.row_count, 1);
    assert_eq!(response.rows[0]["b"], Value::Int(2));
}
