//! Artifact store.
//!
//! Every upload is written to `<root>/<uuid>.bin` and indexed in the state
//! database. Storage paths derive only from the generated id, never from the
//! uploaded name, so two uploads can never collide or escape the root.

use crate::classify::Category;
use crate::error::{IntakeError, Result};
use crate::persistence::artifacts;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at allocating a fresh id before giving up.
const MAX_ID_ATTEMPTS: u32 = 4;

/// One stored upload. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: Uuid,
    /// Name as supplied by the uploader. Informational only.
    pub original_name: String,
    pub stored_path: PathBuf,
    pub size_bytes: u64,
    pub category: Category,
    pub uploaded_by: String,
    pub received_at: DateTime<Utc>,
}

impl Artifact {
    /// Storage location descriptor shown in previews.
    pub fn location(&self) -> String {
        self.stored_path.display().to_string()
    }
}

/// Persists uploads and their metadata.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    pool: SqlitePool,
}

impl ArtifactStore {
    /// Opens the store, creating the root directory if needed.
    pub async fn open(root: &Path, pool: SqlitePool) -> Result<Self> {
        tokio::fs::create_dir_all(root).await.map_err(|e| {
            IntakeError::io(format!(
                "Failed to create storage root {}: {e}",
                root.display()
            ))
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            pool,
        })
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores `bytes` under a fresh id and indexes it.
    ///
    /// The blob is removed again if the index insert fails, so a failed call
    /// leaves nothing behind.
    pub async fn put(
        &self,
        original_name: &str,
        bytes: &[u8],
        category: Category,
        uploaded_by: &str,
    ) -> Result<Artifact> {
        if original_name.trim().is_empty() {
            return Err(IntakeError::empty_input("artifact name is empty"));
        }
        if bytes.is_empty() {
            return Err(IntakeError::empty_input(format!(
                "artifact '{original_name}' has no content"
            )));
        }

        let (id, stored_path) = self.write_blob(bytes).await?;

        let artifact = Artifact {
            id,
            original_name: original_name.to_string(),
            stored_path,
            size_bytes: bytes.len() as u64,
            category,
            uploaded_by: uploaded_by.to_string(),
            received_at: Utc::now(),
        };

        if let Err(e) = artifacts::insert_artifact(&self.pool, &artifact).await {
            if let Err(rm) = tokio::fs::remove_file(&artifact.stored_path).await {
                warn!(
                    "Failed to remove orphaned blob {}: {rm}",
                    artifact.stored_path.display()
                );
            }
            return Err(e);
        }

        info!(
            "Stored artifact {} ({}, {} bytes, {})",
            artifact.id, artifact.original_name, artifact.size_bytes, artifact.category
        );
        Ok(artifact)
    }

    /// Writes the blob with `create_new`, so an existing file is never reused.
    async fn write_blob(&self, bytes: &[u8]) -> Result<(Uuid, PathBuf)> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = Uuid::new_v4();
            let path = self.root.join(format!("{id}.bin"));

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Artifact id {id} already taken, retrying");
                    continue;
                }
                Err(e) => {
                    return Err(IntakeError::io(format!(
                        "Failed to create {}: {e}",
                        path.display()
                    )))
                }
            };

            let written = async {
                file.write_all(bytes).await?;
                file.sync_all().await
            }
            .await;

            if let Err(e) = written {
                drop(file);
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial blob {}: {rm}", path.display());
                }
                return Err(IntakeError::io(format!(
                    "Failed to write {}: {e}",
                    path.display()
                )));
            }

            return Ok((id, path));
        }

        Err(IntakeError::internal(
            "Could not allocate a unique artifact id",
        ))
    }

    /// Looks up an artifact by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Artifact>> {
        artifacts::get_artifact(&self.pool, id).await
    }

    /// Lists every stored artifact, newest first.
    pub async fn list(&self) -> Result<Vec<Artifact>> {
        artifacts::list_artifacts(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ScriptKind;
    use crate::persistence::StateDb;
    use tempfile::tempdir;

    async fn test_store(dir: &Path) -> (StateDb, ArtifactStore) {
        let db = StateDb::open(&dir.join("state.db")).await.unwrap();
        let store = ArtifactStore::open(&dir.join("artifacts"), db.pool().clone())
            .await
            .unwrap();
        (db, store)
    }

    #[tokio::test]
    async fn test_put_writes_blob_and_index() {
        let dir = tempdir().unwrap();
        let (_db, store) = test_store(dir.path()).await;

        let artifact = store
            .put("hello.txt", b"hello world", Category::TextDocument, "alice")
            .await
            .unwrap();

        assert_eq!(artifact.size_bytes, 11);
        assert_eq!(
            artifact.stored_path,
            store.root().join(format!("{}.bin", artifact.id))
        );
        assert_eq!(std::fs::read(&artifact.stored_path).unwrap(), b"hello world");

        let loaded = store.get(artifact.id).await.unwrap().unwrap();
        assert_eq!(loaded.original_name, "hello.txt");
        assert_eq!(loaded.category, Category::TextDocument);
    }

    #[tokio::test]
    async fn test_artifact_json_has_flat_category() {
        let dir = tempdir().unwrap();
        let (_db, store) = test_store(dir.path()).await;

        let artifact = store
            .put("run.py", b"print(1)", Category::ExecutableScript(ScriptKind::Python), "alice")
            .await
            .unwrap();
        let json = serde_json::to_value(&artifact).unwrap();

        assert_eq!(json["category"]["kind"], "executable_script");
        assert_eq!(json["category"]["script_kind"], "python");
        assert!(json["category"].get("category").is_none());
    }

    #[tokio::test]
    async fn test_name_never_reaches_the_path() {
        let dir = tempdir().unwrap();
        let (_db, store) = test_store(dir.path()).await;

        let artifact = store
            .put(
                "../../etc/passwd",
                b"root:x:0:0",
                Category::Unknown,
                "alice",
            )
            .await
            .unwrap();

        assert_eq!(artifact.stored_path.parent(), Some(store.root()));
        assert_eq!(artifact.original_name, "../../etc/passwd");
    }

    #[tokio::test]
    async fn test_empty_inputs_are_rejected() {
        let dir = tempdir().unwrap();
        let (_db, store) = test_store(dir.path()).await;

        let err = store
            .put("a.txt", b"", Category::TextDocument, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::EmptyInput(_)));

        let err = store
            .put("  ", b"data", Category::Unknown, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::EmptyInput(_)));

        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_same_name_twice_gets_distinct_ids() {
        let dir = tempdir().unwrap();
        let (_db, store) = test_store(dir.path()).await;

        let (a, b) = tokio::join!(
            store.put("run.sh", b"echo a", Category::ExecutableScript(ScriptKind::Shell), "alice"),
            store.put("run.sh", b"echo b", Category::ExecutableScript(ScriptKind::Shell), "bob"),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        assert_ne!(a.stored_path, b.stored_path);
        assert_eq!(std::fs::read(&a.stored_path).unwrap(), b"echo a");
        assert_eq!(std::fs::read(&b.stored_path).unwrap(), b"echo b");
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_index_insert_removes_blob() {
        let dir = tempdir().unwrap();
        let (db, store) = test_store(dir.path()).await;

        sqlx::query("DROP TABLE artifacts")
            .execute(db.pool())
            .await
            .unwrap();

        let err = store
            .put("a.txt", b"data", Category::TextDocument, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::Persistence(_)));
        assert_eq!(std::fs::read_dir(store.root()).unwrap().count(), 0);
    }
}
