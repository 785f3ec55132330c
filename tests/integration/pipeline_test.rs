//! End-to-end upload tests through the pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use lab_intake::classify::{Category, ScriptKind};
use lab_intake::error::IntakeError;
use lab_intake::pipeline::{UploadRequest, WarningKind};
use lab_intake::preview::PreviewKind;

use super::{operator, shell_available, test_pipeline, test_pipeline_with};

#[tokio::test]
async fn test_upload_without_principal_is_unauthorized() {
    let (pipeline, dir) = test_pipeline().await;

    let err = pipeline
        .upload(None, UploadRequest::new("run.sh", "echo hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, IntakeError::Unauthorized(_)));
    assert_eq!(err.category(), "Unauthorized");
    // Nothing was stored.
    let stored = std::fs::read_dir(dir.path().join("artifacts")).unwrap().count();
    assert_eq!(stored, 0);
}

#[tokio::test]
async fn test_script_runs_and_reports_output() {
    if !shell_available() {
        eprintln!("Skipping test: sh not available");
        return;
    }
    let (pipeline, _dir) = test_pipeline().await;

    let result = pipeline
        .upload(
            Some(&operator()),
            UploadRequest::new("hello.sh", "echo hello\necho oops >&2\n"),
        )
        .await
        .unwrap();

    assert_eq!(
        result.category,
        Category::ExecutableScript(ScriptKind::Shell)
    );
    assert!(result.preview.is_none());

    let execution = result.execution.as_ref().unwrap();
    assert_eq!(execution.exit_code, Some(0));
    assert!(!execution.timed_out);
    assert_eq!(execution.stdout_text(), "hello\n");
    assert_eq!(execution.stderr_text(), "oops\n");
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_failing_script_is_a_warning_not_an_error() {
    if !shell_available() {
        eprintln!("Skipping test: sh not available");
        return;
    }
    let (pipeline, _dir) = test_pipeline().await;

    let result = pipeline
        .upload(Some(&operator()), UploadRequest::new("fail.sh", "exit 3\n"))
        .await
        .unwrap();

    assert_eq!(result.execution.as_ref().unwrap().exit_code, Some(3));
    assert!(result.has_warning(WarningKind::ExecutionFailure));
}

#[tokio::test]
async fn test_script_past_deadline_is_killed() {
    if !shell_available() {
        eprintln!("Skipping test: sh not available");
        return;
    }
    let (pipeline, _dir) = test_pipeline_with(|c| c.sandbox.timeout_secs = 1).await;

    let start = Instant::now();
    let result = pipeline
        .upload(
            Some(&operator()),
            UploadRequest::new("slow.sh", "echo started\nsleep 30\necho finished\n"),
        )
        .await
        .unwrap();
    let elapsed = start.elapsed();

    let execution = result.execution.as_ref().unwrap();
    assert!(execution.timed_out);
    assert_eq!(execution.exit_code, None);
    assert_eq!(execution.stdout_text(), "started\n");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert!(result.has_warning(WarningKind::ExecutionTimeout));
}

#[tokio::test]
async fn test_missing_interpreter_is_launch_failure() {
    let (pipeline, _dir) = test_pipeline_with(|c| {
        c.sandbox
            .interpreters
            .insert("python".to_string(), "/nonexistent/python3".to_string());
    })
    .await;

    let err = pipeline
        .upload(Some(&operator()), UploadRequest::new("x.py", "print(1)\n"))
        .await
        .unwrap_err();

    assert!(matches!(err, IntakeError::LaunchFailed(_)));
}

#[tokio::test]
async fn test_text_preview_is_bounded_prefix() {
    let (pipeline, _dir) = test_pipeline_with(|c| c.preview.text_limit_bytes = 16).await;
    let body = "0123456789abcdefTHIS PART IS NOT SHOWN";

    let result = pipeline
        .upload(Some(&operator()), UploadRequest::new("long.log", body))
        .await
        .unwrap();

    let preview = result.preview.unwrap();
    assert_eq!(preview.kind, PreviewKind::Text);
    assert_eq!(preview.text_body.as_deref(), Some("0123456789abcdef"));
    assert_eq!(preview.previewed_bytes, 16);
    assert_eq!(preview.total_size_bytes, body.len() as u64);
    assert!(preview.is_truncated());
}

#[tokio::test]
async fn test_binary_preview_hex_length() {
    let (pipeline, _dir) = test_pipeline().await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(5000).collect();

    let result = pipeline
        .upload(Some(&operator()), UploadRequest::new("dump.bin", bytes))
        .await
        .unwrap();

    let preview = result.preview.unwrap();
    assert_eq!(preview.kind, PreviewKind::HexAscii);
    assert_eq!(preview.previewed_bytes, 2048);
    assert_eq!(preview.total_size_bytes, 5000);
    assert_eq!(
        preview.hex_body.unwrap().len() as u64,
        3 * preview.previewed_bytes - 1
    );
    assert_eq!(preview.ascii_body.unwrap().len(), 2048);
    assert_eq!(preview.location, Some(result.artifact.location()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_name_uploads_are_distinct() {
    let (pipeline, _dir) = test_pipeline().await;
    let pipeline = Arc::new(pipeline);

    let mut tasks = JoinSet::new();
    for i in 0..8 {
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            let body = format!("report number {i}");
            let result = pipeline
                .upload(
                    Some(&operator()),
                    UploadRequest::new("report.txt", body.clone()),
                )
                .await;
            (body, result)
        });
    }

    let mut ids = HashSet::new();
    let mut paths = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let (body, result) = joined.unwrap();
        let result = result.unwrap();
        assert_eq!(result.artifact.original_name, "report.txt");
        assert_eq!(
            std::fs::read_to_string(&result.artifact.stored_path).unwrap(),
            body
        );
        ids.insert(result.artifact.id);
        paths.insert(result.artifact.stored_path);
    }
    assert_eq!(ids.len(), 8);
    assert_eq!(paths.len(), 8);

    let listed = pipeline.list_artifacts(Some(&operator())).await.unwrap();
    assert_eq!(listed.len(), 8);
}
