//! Pipeline coordinator.
//!
//! Checks the principal, stores the upload, classifies it, and dispatches to
//! the preview generator or the sandbox. Console queries go through the same
//! principal check.

mod types;

pub use types::{Principal, UploadRequest, UploadResult, Warning, WarningKind};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::classify::{Category, TypeClassifier, PREFIX_LEN};
use crate::config::Config;
use crate::db::{DatabaseClient, SqliteClient};
use crate::error::{IntakeError, Result};
use crate::persistence::{history, HistoryEntry, HistoryFilter, StateDb};
use crate::preview::{PreviewGenerator, PreviewResult};
use crate::query::{QueryConsole, QueryResponse};
use crate::sandbox::{ExecutionOutcome, ExecutionStatus, Sandbox};
use crate::store::{Artifact, ArtifactStore};

/// Entry point for uploads and console queries.
pub struct Pipeline {
    state: StateDb,
    store: ArtifactStore,
    classifier: TypeClassifier,
    previews: PreviewGenerator,
    sandbox: Sandbox,
    sandbox_timeout: Duration,
    console_db: Arc<dyn DatabaseClient>,
    console: QueryConsole,
}

impl Pipeline {
    /// Opens the state database, artifact store and console database named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let state = StateDb::open(&config.state_db_path()).await?;
        let store = ArtifactStore::open(&config.storage_root(), state.pool().clone()).await?;
        let console_db: Arc<dyn DatabaseClient> = Arc::new(
            SqliteClient::open(&config.console_db_path(), config.console.max_rows).await?,
        );
        Ok(Self::from_parts(config, state, store, console_db))
    }

    /// Assembles a pipeline from already-opened parts.
    pub fn from_parts(
        config: &Config,
        state: StateDb,
        store: ArtifactStore,
        console_db: Arc<dyn DatabaseClient>,
    ) -> Self {
        let console = QueryConsole::new(console_db.clone(), &config.console)
            .with_history(state.pool().clone());

        Self {
            state,
            store,
            classifier: TypeClassifier::new(),
            previews: PreviewGenerator::new(&config.preview),
            sandbox: Sandbox::new(config.sandbox.clone()),
            sandbox_timeout: config.sandbox.timeout(),
            console_db,
            console,
        }
    }

    /// Accepts an upload, stores it, and previews or executes it.
    pub async fn upload(
        &self,
        principal: Option<&Principal>,
        request: UploadRequest,
    ) -> Result<UploadResult> {
        let principal = authorize(principal)?;

        let prefix = &request.bytes[..request.bytes.len().min(PREFIX_LEN)];
        let classification = self.classifier.classify(&request.name, prefix);

        let mut warnings = Vec::new();
        if let Some(message) = classification.warning {
            warnings.push(Warning::new(WarningKind::ContentMismatch, message));
        }

        let artifact = self
            .store
            .put(
                &request.name,
                &request.bytes,
                classification.category,
                principal.as_str(),
            )
            .await?;

        debug!(
            "Dispatching artifact {} as {}",
            artifact.id, artifact.category
        );

        let (preview, execution) = match artifact.category {
            Category::ExecutableScript(kind) if self.sandbox.is_enabled() => {
                let outcome = self.sandbox.execute(&artifact.stored_path, kind).await?;
                warnings.extend(self.execution_warnings(&outcome));
                (None, Some(outcome))
            }
            Category::ExecutableScript(kind) => {
                warnings.push(Warning::new(
                    WarningKind::ExecutionDisabled,
                    format!("execution is disabled; showing {kind} source as text"),
                ));
                (Some(self.text_preview(&artifact).await?), None)
            }
            Category::TextDocument => (Some(self.text_preview(&artifact).await?), None),
            Category::BinaryDocument => {
                let preview = self
                    .previews
                    .binary_preview(&artifact.stored_path, artifact.size_bytes, artifact.location())
                    .await?;
                (Some(preview), None)
            }
            Category::Unknown => {
                warnings.push(Warning::new(
                    WarningKind::UnsupportedType,
                    format!("no preview available for '{}'", artifact.original_name),
                ));
                (Some(PreviewResult::unsupported(artifact.size_bytes)), None)
            }
        };

        info!(
            "Upload {} by {principal} finished with {} warning(s)",
            artifact.id,
            warnings.len()
        );

        Ok(UploadResult {
            category: artifact.category,
            artifact,
            preview,
            execution,
            warnings,
        })
    }

    /// Runs console SQL on behalf of `principal`.
    ///
    /// Only a missing principal is an `Err`; every query failure is folded into
    /// the response.
    pub async fn query(&self, principal: Option<&Principal>, text: &str) -> Result<QueryResponse> {
        let principal = authorize(principal)?;
        Ok(self.console.run(principal.as_str(), text).await)
    }

    /// Lists every stored artifact, newest first.
    pub async fn list_artifacts(&self, principal: Option<&Principal>) -> Result<Vec<Artifact>> {
        authorize(principal)?;
        self.store.list().await
    }

    /// Returns the caller's most recent console queries.
    pub async fn query_history(
        &self,
        principal: Option<&Principal>,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let principal = authorize(principal)?;
        let filter = HistoryFilter {
            principal: Some(principal.as_str().to_string()),
            limit: Some(limit as i64),
            ..Default::default()
        };
        history::list_history(self.state.pool(), &filter).await
    }

    /// Loads a SQL script into the console database.
    pub async fn seed_console(&self, principal: Option<&Principal>, script: &str) -> Result<u64> {
        let principal = authorize(principal)?;
        if script.trim().is_empty() {
            return Err(IntakeError::empty_input("seed script is empty"));
        }
        let affected = self.console_db.execute_script(script).await?;
        info!("Console database seeded by {principal} ({affected} rows affected)");
        Ok(affected)
    }

    /// Closes the state and console databases.
    pub async fn close(&self) -> Result<()> {
        self.console_db.close().await?;
        self.state.close().await;
        Ok(())
    }

    async fn text_preview(&self, artifact: &Artifact) -> Result<PreviewResult> {
        self.previews
            .text_preview(&artifact.stored_path, artifact.size_bytes)
            .await
    }

    fn execution_warnings(&self, outcome: &ExecutionOutcome) -> Vec<Warning> {
        let mut warnings = Vec::new();

        match outcome.status() {
            ExecutionStatus::Completed => {}
            ExecutionStatus::TimedOut => warnings.push(Warning::new(
                WarningKind::ExecutionTimeout,
                format!(
                    "script exceeded {} ms and was killed",
                    self.sandbox_timeout.as_millis()
                ),
            )),
            ExecutionStatus::Failed => warnings.push(Warning::new(
                WarningKind::ExecutionFailure,
                match outcome.exit_code {
                    Some(code) => format!("script exited with status {code}"),
                    None => "script was terminated by a signal".to_string(),
                },
            )),
        }

        if outcome.is_truncated() {
            warnings.push(Warning::new(
                WarningKind::OutputTruncated,
                "script output exceeded the capture limit",
            ));
        }

        warnings
    }
}

fn authorize(principal: Option<&Principal>) -> Result<&Principal> {
    match principal {
        Some(p) if !p.as_str().trim().is_empty() => Ok(p),
        _ => Err(IntakeError::unauthorized(
            "an authenticated principal is required",
        )),
    }
}
