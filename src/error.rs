//! Error types for the intake pipeline.
//!
//! Defines the main error enum returned by every fallible operation. Conditions
//! that are informational (timeouts, non-zero exits, unsupported types) are not
//! errors; they travel as warnings inside the result envelopes.

use thiserror::Error;

/// Main error type for intake operations.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// No authenticated principal accompanied the request.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request carried no usable input (empty upload, empty name).
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Storage read/write failures.
    #[error("IO error: {0}")]
    Io(String),

    /// The interpreter could not be started (missing binary, permission denied).
    #[error("Launch failed: {0}")]
    LaunchFailed(String),

    /// Query execution errors that escape the console envelope.
    #[error("Query error: {0}")]
    Query(String),

    /// A query ran past its deadline and was interrupted.
    #[error("Query timed out: {0}")]
    QueryTimeout(String),

    /// Configuration errors (invalid config file, bad values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// State database errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntakeError {
    /// Creates an unauthorized error with the given message.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Creates an empty-input error with the given message.
    pub fn empty_input(msg: impl Into<String>) -> Self {
        Self::EmptyInput(msg.into())
    }

    /// Creates an IO error with the given message.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Creates a launch failure with the given message.
    pub fn launch_failed(msg: impl Into<String>) -> Self {
        Self::LaunchFailed(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a query timeout with the given message.
    pub fn query_timeout(msg: impl Into<String>) -> Self {
        Self::QueryTimeout(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "Unauthorized",
            Self::EmptyInput(_) => "Empty Input",
            Self::Io(_) => "IO Error",
            Self::LaunchFailed(_) => "Launch Failed",
            Self::Query(_) => "Query Error",
            Self::QueryTimeout(_) => "Query Timeout",
            Self::Config(_) => "Configuration Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using IntakeError.
pub type Result<T> = std::result::Result<T, IntakeError>;
