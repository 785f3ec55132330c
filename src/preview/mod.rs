//! Bounded previews for non-executable artifacts.
//!
//! Previews never execute content and never read more than the configured
//! limit from storage.

mod generator;
mod hexdump;

pub use generator::PreviewGenerator;
pub use hexdump::{ascii_body, hex_body};

use serde::{Deserialize, Serialize};

/// Body text returned for artifacts the pipeline cannot preview.
pub const UNSUPPORTED_BODY: &str = "unsupported category";

/// How a preview is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Text,
    HexAscii,
}

/// A bounded, human-readable rendering of an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewResult {
    pub kind: PreviewKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex_body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ascii_body: Option<String>,

    /// Size of the whole artifact.
    pub total_size_bytes: u64,

    /// Number of artifact bytes the preview covers.
    pub previewed_bytes: u64,

    /// Storage location descriptor (binary previews only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl PreviewResult {
    /// Creates the placeholder preview for unsupported categories.
    pub fn unsupported(total_size_bytes: u64) -> Self {
        Self {
            kind: PreviewKind::Text,
            text_body: Some(UNSUPPORTED_BODY.to_string()),
            hex_body: None,
            ascii_body: None,
            total_size_bytes,
            previewed_bytes: 0,
            location: None,
        }
    }

    /// Returns true if the preview covers less than the whole artifact.
    pub fn is_truncated(&self) -> bool {
        self.previewed_bytes < self.total_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_preview() {
        let preview = PreviewResult::unsupported(42);
        assert_eq!(preview.kind, PreviewKind::Text);
        assert_eq!(preview.text_body.as_deref(), Some(UNSUPPORTED_BODY));
        assert_eq!(preview.total_size_bytes, 42);
        assert!(preview.hex_body.is_none());
    }

    #[test]
    fn test_unsupported_preview_serializes_without_empty_bodies() {
        let json = serde_json::to_value(PreviewResult::unsupported(0)).unwrap();
        assert_eq!(json["kind"], "text");
        assert!(json.get("hex_body").is_none());
        assert!(json.get("location").is_none());
    }
}
