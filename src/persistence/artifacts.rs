//! Artifact index persistence.
//!
//! One row per stored upload. Rows are written once and never updated.

use crate::classify::Category;
use crate::error::{IntakeError, Result};
use crate::store::Artifact;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::path::PathBuf;
use uuid::Uuid;

/// Raw database row for an artifact.
#[derive(Debug, Clone, FromRow)]
struct ArtifactRow {
    id: String,
    original_name: String,
    stored_path: String,
    size_bytes: i64,
    category: String,
    uploaded_by: String,
    received_at: String,
}

impl TryFrom<ArtifactRow> for Artifact {
    type Error = IntakeError;

    fn try_from(row: ArtifactRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id).map_err(|e| {
            IntakeError::persistence(format!("Invalid artifact id '{}': {e}", row.id))
        })?;
        let received_at = DateTime::parse_from_rfc3339(&row.received_at)
            .map_err(|e| {
                IntakeError::persistence(format!(
                    "Invalid timestamp for artifact {}: {e}",
                    row.id
                ))
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            original_name: row.original_name,
            stored_path: PathBuf::from(row.stored_path),
            size_bytes: row.size_bytes.max(0) as u64,
            category: Category::from_storage_str(&row.category),
            uploaded_by: row.uploaded_by,
            received_at,
        })
    }
}

/// Inserts a new artifact row.
pub async fn insert_artifact(pool: &SqlitePool, artifact: &Artifact) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artifacts
        (id, original_name, stored_path, size_bytes, category, uploaded_by, received_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(artifact.id.to_string())
    .bind(&artifact.original_name)
    .bind(artifact.stored_path.to_string_lossy().into_owned())
    .bind(artifact.size_bytes as i64)
    .bind(artifact.category.to_storage_string())
    .bind(&artifact.uploaded_by)
    .bind(artifact.received_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| {
        IntakeError::persistence(format!("Failed to record artifact {}: {e}", artifact.id))
    })?;

    Ok(())
}

/// Gets a single artifact by id.
pub async fn get_artifact(pool: &SqlitePool, id: Uuid) -> Result<Option<Artifact>> {
    let row: Option<ArtifactRow> = sqlx::query_as(
        r#"
        SELECT id, original_name, stored_path, size_bytes, category, uploaded_by, received_at
        FROM artifacts
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| IntakeError::persistence(format!("Failed to get artifact: {e}")))?;

    row.map(Artifact::try_from).transpose()
}

/// Lists all artifacts, newest first.
pub async fn list_artifacts(pool: &SqlitePool) -> Result<Vec<Artifact>> {
    let rows: Vec<ArtifactRow> = sqlx::query_as(
        r#"
        SELECT id, original_name, stored_path, size_bytes, category, uploaded_by, received_at
        FROM artifacts
        ORDER BY received_at DESC, rowid DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(|e| IntakeError::persistence(format!("Failed to list artifacts: {e}")))?;

    rows.into_iter().map(Artifact::try_from).collect()
}
