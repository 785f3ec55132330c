//! Preview generation from stored artifacts.

use std::path::Path;

use tokio::io::AsyncReadExt;
use tracing::debug;

use super::{ascii_body, hex_body, PreviewKind, PreviewResult};
use crate::config::PreviewConfig;
use crate::error::{IntakeError, Result};

/// Produces bounded previews according to the configured limits.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    text_limit: usize,
    binary_prefix: usize,
}

impl PreviewGenerator {
    /// Creates a generator from preview settings.
    pub fn new(config: &PreviewConfig) -> Self {
        Self {
            text_limit: config.text_limit_bytes,
            binary_prefix: config.binary_prefix_bytes,
        }
    }

    /// Decodes up to the text limit as UTF-8, replacing invalid sequences.
    pub async fn text_preview(&self, path: &Path, total_size_bytes: u64) -> Result<PreviewResult> {
        let bytes = read_prefix(path, self.text_limit).await?;
        debug!(
            "Text preview of {}: {} of {} bytes",
            path.display(),
            bytes.len(),
            total_size_bytes
        );

        Ok(PreviewResult {
            kind: PreviewKind::Text,
            text_body: Some(String::from_utf8_lossy(&bytes).into_owned()),
            hex_body: None,
            ascii_body: None,
            total_size_bytes,
            previewed_bytes: bytes.len() as u64,
            location: None,
        })
    }

    /// Renders the binary prefix as paired hex and ASCII.
    pub async fn binary_preview(
        &self,
        path: &Path,
        total_size_bytes: u64,
        location: impl Into<String>,
    ) -> Result<PreviewResult> {
        let bytes = read_prefix(path, self.binary_prefix).await?;

        Ok(PreviewResult {
            kind: PreviewKind::HexAscii,
            text_body: None,
            hex_body: Some(hex_body(&bytes)),
            ascii_body: Some(ascii_body(&bytes)),
            total_size_bytes,
            previewed_bytes: bytes.len() as u64,
            location: Some(location.into()),
        })
    }
}

impl Default for PreviewGenerator {
    fn default() -> Self {
        Self::new(&PreviewConfig::default())
    }
}

/// Reads at most `limit` bytes from the start of a file.
async fn read_prefix(path: &Path, limit: usize) -> Result<Vec<u8>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| IntakeError::io(format!("Failed to open {}: {e}", path.display())))?;

    let mut bytes = Vec::with_capacity(limit.min(64 * 1024));
    file.take(limit as u64)
        .read_to_end(&mut bytes)
        .await
        .map_err(|e| IntakeError::io(format!("Failed to read {}: {e}", path.display())))?;

    Ok(bytes)
}
