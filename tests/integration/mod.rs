//! Integration tests for lab-intake.

pub mod persistence_test;
pub mod pipeline_test;
pub mod query_test;

use lab_intake::config::Config;
use lab_intake::pipeline::{Pipeline, Principal};
use tempfile::TempDir;

/// Opens a pipeline whose storage and databases all live in a fresh temp dir.
pub async fn test_pipeline_with(adjust: impl FnOnce(&mut Config)) -> (Pipeline, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::rooted_at(dir.path());
    adjust(&mut config);
    let pipeline = Pipeline::open(&config).await.unwrap();
    (pipeline, dir)
}

pub async fn test_pipeline() -> (Pipeline, TempDir) {
    test_pipeline_with(|_| {}).await
}

pub fn operator() -> Principal {
    Principal::new("operator")
}

/// Returns true if a POSIX shell can be launched.
pub fn shell_available() -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg("true")
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
