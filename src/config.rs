//! Configuration management for the intake pipeline.
//!
//! Handles loading configuration from TOML files and environment variables.
//! Every section is optional; a missing file yields the defaults.

use crate::classify::ScriptKind;
use crate::error::{IntakeError, Result};
use crate::query::QueryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest deadline accepted for a script run or a console query (one day).
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub preview: PreviewConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub console: ConsoleConfig,
}

/// Where artifacts and the state database live.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory holding one file per uploaded artifact.
    pub root: Option<PathBuf>,

    /// State database (artifact index and query history).
    pub state_db: Option<PathBuf>,
}

/// Preview size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Maximum bytes decoded for a text preview.
    #[serde(default = "default_text_limit")]
    pub text_limit_bytes: usize,

    /// Bytes rendered as hex/ASCII for a binary preview.
    #[serde(default = "default_binary_prefix")]
    pub binary_prefix_bytes: usize,
}

fn default_text_limit() -> usize {
    64 * 1024
}

fn default_binary_prefix() -> usize {
    2048
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            text_limit_bytes: default_text_limit(),
            binary_prefix_bytes: default_binary_prefix(),
        }
    }
}

/// Script execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Whether script artifacts are executed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Wall-clock limit per execution.
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,

    /// Capture limit for each of stdout and stderr.
    #[serde(default = "default_output_limit")]
    pub output_limit_bytes: usize,

    /// Interpreter overrides keyed by script kind (`python = "/usr/bin/python3.12"`).
    #[serde(default)]
    pub interpreters: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_sandbox_timeout() -> u64 {
    10
}

fn default_output_limit() -> usize {
    1024 * 1024
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_sandbox_timeout(),
            output_limit_bytes: default_output_limit(),
            interpreters: HashMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Returns the execution deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the interpreter program for a script kind.
    pub fn interpreter_for(&self, kind: ScriptKind) -> &str {
        self.interpreters
            .get(kind.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_interpreter())
    }
}

/// Query console settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// SQLite database the console runs against.
    pub database: Option<PathBuf>,

    /// Which statements the console accepts.
    #[serde(default)]
    pub policy: QueryPolicy,

    /// Deadline for a single query.
    #[serde(default = "default_console_timeout")]
    pub timeout_secs: u64,

    /// Maximum rows returned from one query.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
}

fn default_console_timeout() -> u64 {
    30
}

fn default_max_rows() -> usize {
    1000
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            database: None,
            policy: QueryPolicy::default(),
            timeout_secs: default_console_timeout(),
            max_rows: default_max_rows(),
        }
    }
}

impl ConsoleConfig {
    /// Returns the query deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lab-intake")
            .join("config.toml")
    }

    /// Returns the default data directory for artifacts and databases.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lab-intake")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| IntakeError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            IntakeError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sandbox.timeout_secs == 0 {
            return Err(IntakeError::config(
                "sandbox.timeout_secs must be greater than zero",
            ));
        }
        if self.console.timeout_secs == 0 {
            return Err(IntakeError::config(
                "console.timeout_secs must be greater than zero",
            ));
        }
        if self.sandbox.timeout_secs > MAX_TIMEOUT_SECS
            || self.console.timeout_secs > MAX_TIMEOUT_SECS
        {
            return Err(IntakeError::config(format!(
                "timeout_secs must not exceed {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.preview.text_limit_bytes == 0 || self.preview.binary_prefix_bytes == 0 {
            return Err(IntakeError::config("preview limits must be greater than zero"));
        }
        for key in self.sandbox.interpreters.keys() {
            if ScriptKind::parse(key).is_none() {
                return Err(IntakeError::config(format!(
                    "Unknown script kind '{key}' in sandbox.interpreters"
                )));
            }
        }
        Ok(())
    }

    /// Applies `INTAKE_*` environment variables on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("INTAKE_STORAGE_ROOT") {
            self.storage.root = Some(PathBuf::from(root));
        }
        if let Ok(db) = std::env::var("INTAKE_CONSOLE_DB") {
            self.console.database = Some(PathBuf::from(db));
        }
        if let Ok(enabled) = std::env::var("INTAKE_SANDBOX_ENABLED") {
            if let Some(value) = parse_bool(&enabled) {
                self.sandbox.enabled = value;
            }
        }
    }

    /// Resolved artifact storage directory.
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("artifacts"))
    }

    /// Resolved state database path.
    pub fn state_db_path(&self) -> PathBuf {
        self.storage
            .state_db
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("state.db"))
    }

    /// Resolved console database path.
    pub fn console_db_path(&self) -> PathBuf {
        self.console
            .database
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("lab.db"))
    }

    /// Builds a config rooted entirely inside `dir`. Used by tests and demos.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            storage: StorageConfig {
                root: Some(dir.join("artifacts")),
                state_db: Some(dir.join("state.db")),
            },
            console: ConsoleConfig {
                database: Some(dir.join("lab.db")),
                ..ConsoleConfig::default()
            },
            ..Self::default()
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
