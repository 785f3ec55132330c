//! Command-line argument parsing for intake.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lab_intake::config::Config;
use lab_intake::pipeline::Principal;

/// Artifact intake with bounded previews, sandboxed scripts and a SQL console.
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Authenticated principal the request runs as
    #[arg(long, value_name = "ID", env = "INTAKE_PRINCIPAL", global = true)]
    pub principal: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Upload a file, then preview or execute it
    Upload {
        /// File to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Name to record instead of the file name
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },

    /// Run SQL on the console database
    Query {
        #[arg(value_name = "SQL")]
        sql: String,
    },

    /// List stored artifacts
    List,

    /// Show recent console queries
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Load a SQL script into the console database
    Seed {
        #[arg(value_name = "SQL_FILE")]
        file: PathBuf,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Returns the principal, if one was given and is not blank.
    pub fn principal(&self) -> Option<Principal> {
        self.principal
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Principal::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_upload() {
        let cli = parse_args(&["intake", "--principal", "alice", "upload", "run.py"]);
        assert_eq!(
            cli.command,
            Command::Upload {
                file: PathBuf::from("run.py"),
                name: None
            }
        );
        assert_eq!(cli.principal(), Some(Principal::new("alice")));
    }

    #[test]
    fn test_parse_upload_with_name() {
        let cli = parse_args(&["intake", "upload", "/tmp/x", "--name", "report.pdf"]);
        assert_eq!(
            cli.command,
            Command::Upload {
                file: PathBuf::from("/tmp/x"),
                name: Some("report.pdf".to_string())
            }
        );
    }

    #[test]
    fn test_parse_query() {
        let cli = parse_args(&["intake", "query", "SELECT * FROM users"]);
        assert_eq!(
            cli.command,
            Command::Query {
                sql: "SELECT * FROM users".to_string()
            }
        );
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = parse_args(&[
            "intake",
            "history",
            "--limit",
            "5",
            "--config",
            "/etc/intake.toml",
            "--principal",
            "bob",
        ]);
        assert_eq!(cli.command, Command::History { limit: 5 });
        assert_eq!(cli.config_path(), PathBuf::from("/etc/intake.toml"));
        assert_eq!(cli.principal(), Some(Principal::new("bob")));
    }

    #[test]
    fn test_history_default_limit() {
        let cli = parse_args(&["intake", "history"]);
        assert_eq!(cli.command, Command::History { limit: 20 });
    }

    #[test]
    fn test_blank_principal_is_none() {
        let cli = parse_args(&["intake", "--principal", "  ", "list"]);
        assert_eq!(cli.principal(), None);
    }

    #[test]
    fn test_default_config_path() {
        let cli = parse_args(&["intake", "list"]);
        assert_eq!(cli.config_path(), Config::default_path());
    }
}
