//! Request and response envelopes for the pipeline.

use crate::classify::Category;
use crate::preview::PreviewResult;
use crate::sandbox::ExecutionOutcome;
use crate::store::Artifact;
use serde::Serialize;
use std::fmt;

/// Opaque identity of an authenticated caller.
///
/// Authentication happens outside the pipeline; only presence is checked here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uploaded file as received from the caller.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Name supplied by the uploader.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Informational conditions attached to an upload. None of these fail the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnsupportedType,
    ExecutionTimeout,
    ExecutionFailure,
    ExecutionDisabled,
    OutputTruncated,
    ContentMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Uniform envelope produced by every successful upload.
///
/// Scripts carry `execution`; everything else carries `preview`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub artifact: Artifact,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PreviewResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionOutcome>,
    pub warnings: Vec<Warning>,
}

impl UploadResult {
    /// Returns true if any warning of `kind` was attached.
    pub fn has_warning(&self, kind: WarningKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }
}
