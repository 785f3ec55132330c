//! Controlled execution of script artifacts.
//!
//! Each run launches exactly one interpreter process inside a throwaway
//! directory that holds only a copy of the artifact. Output is captured into
//! bounded buffers and the whole process group is killed when the deadline
//! expires, so nothing the script started can outlive the call.

mod capture;
mod process;
mod runner;

pub use capture::BoundedBuffer;
pub use process::SANDBOX_PATH;
pub use runner::Sandbox;

use serde::{Serialize, Serializer};
use std::fmt;

use crate::error::{IntakeError, Result};

/// Outcome of one execution attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionOutcome {
    /// Process exit code; `None` when killed by a signal or the deadline.
    pub exit_code: Option<i32>,

    #[serde(serialize_with = "lossy_utf8")]
    pub stdout: Vec<u8>,

    #[serde(serialize_with = "lossy_utf8")]
    pub stderr: Vec<u8>,

    pub duration_ms: u64,

    pub timed_out: bool,

    pub stdout_truncated: bool,

    pub stderr_truncated: bool,
}

impl ExecutionOutcome {
    /// Terminal classification of the outcome.
    pub fn status(&self) -> ExecutionStatus {
        if self.timed_out {
            ExecutionStatus::TimedOut
        } else if self.exit_code == Some(0) {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        }
    }

    /// Lossy stdout text, with a marker line if bytes were dropped.
    pub fn stdout_text(&self) -> String {
        render_stream(&self.stdout, self.stdout_truncated)
    }

    /// Lossy stderr text, with a marker line if bytes were dropped.
    pub fn stderr_text(&self) -> String {
        render_stream(&self.stderr, self.stderr_truncated)
    }

    /// Returns true if either stream hit the capture limit.
    pub fn is_truncated(&self) -> bool {
        self.stdout_truncated || self.stderr_truncated
    }
}

/// Marker appended to rendered output that hit the capture limit.
pub const TRUNCATION_MARKER: &str = "[output truncated]";

fn render_stream(bytes: &[u8], truncated: bool) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    if truncated {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(TRUNCATION_MARKER);
    }
    text
}

fn lossy_utf8<S>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

/// How an execution ended, from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Exited with status zero before the deadline.
    Completed,
    /// Exited non-zero or was killed by a signal.
    Failed,
    /// Killed at the deadline.
    TimedOut,
}

/// Lifecycle of one sandbox invocation.
///
/// `Pending → Running → {Completed, TimedOut}` or `Pending → LaunchFailed`.
/// All three end states are terminal; there are no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Pending,
    Running,
    Completed,
    TimedOut,
    LaunchFailed,
}

impl SandboxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::LaunchFailed)
    }

    fn can_transition_to(&self, next: SandboxState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::LaunchFailed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::TimedOut)
        )
    }

    /// Moves to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: SandboxState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(IntakeError::internal(format!(
                "invalid sandbox transition {self} -> {next}"
            )));
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::TimedOut => write!(f, "TimedOut"),
            Self::LaunchFailed => write!(f, "LaunchFailed"),
        }
    }
}
