//! Child process setup and process-group termination.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

/// Search path handed to sandboxed interpreters; nothing else is inherited.
pub const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Builds the interpreter command for a script inside `workdir`.
///
/// The child gets a cleared environment, null stdin, piped stdout/stderr and,
/// on Unix, its own process group so the whole tree can be signalled at once.
pub fn build_command(interpreter: &str, script_name: &str, workdir: &Path) -> Command {
    let mut cmd = Command::new(interpreter);
    cmd.arg(script_name)
        .current_dir(workdir)
        .env_clear()
        .env("PATH", SANDBOX_PATH)
        .env("HOME", workdir)
        .env("TMPDIR", workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

/// Kills the child's process group when dropped, unless already done.
///
/// The group id equals the child's pid because the child is spawned as a
/// group leader.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Sends SIGKILL to every process in the group. Idempotent.
    pub fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        warn!("Process group id {pgid} out of range; not signalled");
        return;
    };

    // SAFETY: killpg only sends a signal; an invalid or empty group yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!("Sent SIGKILL to process group {pgid}");
    } else {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!("Failed to kill process group {pgid}: {err}");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {
    // Only the direct child is killed (by `kill_on_drop`) on this platform.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_without_pid_is_noop() {
        let mut guard = ProcessGroupGuard::new(None);
        guard.kill();
        guard.kill();
    }

    #[test]
    fn test_sandbox_path_excludes_current_dir() {
        assert!(SANDBOX_PATH.split(':').all(|p| p.starts_with('/')));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runs_in_workdir_with_cleared_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("probe.sh"), "pwd; echo \"${SECRET_TOKEN:-unset}\"").unwrap();
        std::env::set_var("SECRET_TOKEN", "leaked");

        let output = build_command("sh", "probe.sh", dir.path())
            .output()
            .await
            .unwrap();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        let cwd = std::fs::canonicalize(lines.next().unwrap()).unwrap();
        assert_eq!(cwd, std::fs::canonicalize(dir.path()).unwrap());
        assert_eq!(lines.next(), Some("unset"));
    }
}
