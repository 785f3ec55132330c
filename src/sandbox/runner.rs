//! Sandbox runner: spawn, capture, deadline, teardown.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::capture::{spawn_drain, take_buffer, SharedBuffer};
use super::process::{build_command, ProcessGroupGuard};
use super::{ExecutionOutcome, SandboxState};
use crate::classify::ScriptKind;
use crate::config::SandboxConfig;
use crate::error::{IntakeError, Result};

/// How long to wait for pipes to close after the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// How long to wait for the kernel to reap a killed child.
const REAP_GRACE: Duration = Duration::from_secs(2);

/// Runs script artifacts as bounded child processes.
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    /// Creates a sandbox from execution settings.
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Returns true if script execution is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Executes the artifact at `artifact_path` with the configured timeout.
    pub async fn execute(&self, artifact_path: &Path, kind: ScriptKind) -> Result<ExecutionOutcome> {
        self.execute_with_timeout(artifact_path, kind, self.config.timeout())
            .await
    }

    /// Executes the artifact with an explicit deadline.
    ///
    /// Returns `LaunchFailed` if the interpreter cannot be started. Timeouts and
    /// non-zero exits are reported through the outcome, with whatever output was
    /// captured up to that point.
    pub async fn execute_with_timeout(
        &self,
        artifact_path: &Path,
        kind: ScriptKind,
        timeout: Duration,
    ) -> Result<ExecutionOutcome> {
        let mut state = SandboxState::Pending;

        // Dropping the TempDir removes the copy on every return path.
        let workdir = tempfile::Builder::new()
            .prefix("intake-run-")
            .tempdir()
            .map_err(|e| IntakeError::io(format!("Failed to create sandbox directory: {e}")))?;

        let script_name = format!("script.{}", kind.file_extension());
        tokio::fs::copy(artifact_path, workdir.path().join(&script_name))
            .await
            .map_err(|e| {
                IntakeError::io(format!(
                    "Failed to stage {} for execution: {e}",
                    artifact_path.display()
                ))
            })?;

        let interpreter = self.config.interpreter_for(kind);
        let mut cmd = build_command(interpreter, &script_name, workdir.path());

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                state.advance(SandboxState::LaunchFailed)?;
                warn!("Sandbox launch failed for {kind} via '{interpreter}': {e}");
                return Err(IntakeError::launch_failed(format!(
                    "Failed to start '{interpreter}': {e}"
                )));
            }
        };
        let mut group = ProcessGroupGuard::new(child.id());
        state.advance(SandboxState::Running)?;
        info!(
            "Sandbox running {kind} script (pid {:?}, timeout {:?})",
            child.id(),
            timeout
        );

        let limit = self.config.output_limit_bytes;
        let stdout = child
            .stdout
            .take()
            .map(|s| spawn_drain(s, limit, "stdout"));
        let stderr = child
            .stderr
            .take()
            .map(|s| spawn_drain(s, limit, "stderr"));

        let waited = match started.checked_add(timeout) {
            Some(deadline) => {
                tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), child.wait())
                    .await
            }
            // Too far out to represent; tokio treats it as no deadline.
            None => tokio::time::timeout(timeout, child.wait()).await,
        };
        let (exit_code, timed_out) = match waited {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(e)) => {
                group.kill();
                return Err(IntakeError::internal(format!(
                    "Failed to wait for sandboxed process: {e}"
                )));
            }
            Err(_) => {
                warn!("Sandbox deadline of {timeout:?} expired; killing process group");
                group.kill();
                if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
                    warn!("Killed sandbox child was not reaped within {REAP_GRACE:?}");
                }
                (None, true)
            }
        };

        // Background processes the script left behind share its group.
        group.kill();

        let duration = started.elapsed();
        let (stdout, stdout_truncated) = finish_drain(stdout).await;
        let (stderr, stderr_truncated) = finish_drain(stderr).await;

        state.advance(if timed_out {
            SandboxState::TimedOut
        } else {
            SandboxState::Completed
        })?;
        info!(
            "Sandbox {state}: exit={:?}, {} ms, stdout={}B, stderr={}B",
            exit_code,
            duration.as_millis(),
            stdout.len(),
            stderr.len()
        );

        if let Err(e) = workdir.close() {
            warn!("Failed to remove sandbox directory: {e}");
        }

        Ok(ExecutionOutcome {
            exit_code,
            stdout,
            stderr,
            duration_ms: duration.as_millis() as u64,
            timed_out,
            stdout_truncated,
            stderr_truncated,
        })
    }
}

/// Waits briefly for a drain task, then takes whatever it captured.
async fn finish_drain(
    drain: Option<(SharedBuffer, tokio::task::JoinHandle<()>)>,
) -> (Vec<u8>, bool) {
    let Some((buffer, handle)) = drain else {
        return (Vec::new(), false);
    };

    let abort = handle.abort_handle();
    if tokio::time::timeout(DRAIN_GRACE, handle).await.is_err() {
        debug!("Output pipe still open after {DRAIN_GRACE:?}; keeping partial capture");
        abort.abort();
    }

    take_buffer(&buffer)
}
