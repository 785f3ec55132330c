//! Artifact type classification.
//!
//! Assigns every artifact to exactly one content category by looking up its
//! file extension. Classification never reads beyond the supplied prefix and
//! never executes anything.

mod extensions;

pub use extensions::{classify_artifact, TypeClassifier, PREFIX_LEN};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Interpreter families the sandbox knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Python,
    Shell,
    Bash,
    JavaScript,
    Ruby,
    Perl,
}

impl ScriptKind {
    /// All known script kinds, in table order.
    pub const ALL: [ScriptKind; 6] = [
        Self::Python,
        Self::Shell,
        Self::Bash,
        Self::JavaScript,
        Self::Ruby,
        Self::Perl,
    ];

    /// Returns the kind as a string for persistence and config keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::Shell => "shell",
            Self::Bash => "bash",
            Self::JavaScript => "javascript",
            Self::Ruby => "ruby",
            Self::Perl => "perl",
        }
    }

    /// Parses a kind from its persisted string.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }

    /// Interpreter program used when the config does not override it.
    pub fn default_interpreter(&self) -> &'static str {
        match self {
            Self::Python => "python3",
            Self::Shell => "sh",
            Self::Bash => "bash",
            Self::JavaScript => "node",
            Self::Ruby => "ruby",
            Self::Perl => "perl",
        }
    }

    /// File extension given to the artifact copy inside the sandbox.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Shell => "sh",
            Self::Bash => "bash",
            Self::JavaScript => "js",
            Self::Ruby => "rb",
            Self::Perl => "pl",
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content category of an artifact. Assigned once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "script_kind", rename_all = "snake_case")]
pub enum Category {
    ExecutableScript(ScriptKind),
    TextDocument,
    BinaryDocument,
    Unknown,
}

impl Category {
    /// Returns the category as a string for persistence.
    ///
    /// Scripts are stored as `script:<kind>`.
    pub fn to_storage_string(&self) -> String {
        match self {
            Self::ExecutableScript(kind) => format!("script:{}", kind.as_str()),
            Self::TextDocument => "text".to_string(),
            Self::BinaryDocument => "binary".to_string(),
            Self::Unknown => "unknown".to_string(),
        }
    }

    /// Parses a category from its persisted string. Unrecognised values map to `Unknown`.
    pub fn from_storage_str(s: &str) -> Self {
        match s {
            "text" => Self::TextDocument,
            "binary" => Self::BinaryDocument,
            other => other
                .strip_prefix("script:")
                .and_then(ScriptKind::parse)
                .map(Self::ExecutableScript)
                .unwrap_or(Self::Unknown),
        }
    }

    /// Returns true if this category is run by the sandbox.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::ExecutableScript(_))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutableScript(kind) => write!(f, "Executable script ({kind})"),
            Self::TextDocument => write!(f, "Text document"),
            Self::BinaryDocument => write!(f, "Binary document"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The assigned category.
    pub category: Category,
    /// Optional note about content that disagrees with the extension.
    pub warning: Option<String>,
}

impl Classification {
    /// Creates a classification without a warning.
    pub fn new(category: Category) -> Self {
        Self {
            category,
            warning: None,
        }
    }

    /// Creates a classification carrying a warning message.
    pub fn with_warning(category: Category, warning: impl Into<String>) -> Self {
        Self {
            category,
            warning: Some(warning.into()),
        }
    }
}
