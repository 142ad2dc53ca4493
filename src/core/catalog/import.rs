//! Workflow import: file paths, inline content, and the chunked session
//! protocol for payloads that exceed a single request.

use crate::core::catalog::workflow::{
    load_workflow_file, parse_workflow_str, SurfaceFormat, WorkflowDefinition,
};
use crate::core::catalog::CatalogRegistry;
use crate::core::error::AppError;
use crate::core::vector_store::VectorStore;
use dashmap::DashMap;
use serde::Serialize;
use signalbox_types::{ErrorCategory, Namespace};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What to import.
pub enum ImportPayload<'a> {
    File(&'a Path),
    Inline {
        content: &'a str,
        content_type: &'a str,
        source_name: &'a str,
    },
}

/// Result of a completed import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub name: String,
    pub overwritten: bool,
}

struct ImportSession {
    content_type: String,
    source_name: String,
    buffer: String,
}

/// Coordinates imports against the registry, the vector store (stale
/// embeddings), and the managed artifact directory.
pub struct ImportManager {
    registry: Arc<CatalogRegistry>,
    store: Arc<VectorStore>,
    artifacts_dir: Option<PathBuf>,
    sessions: DashMap<Uuid, ImportSession>,
}

impl ImportManager {
    pub fn new(
        registry: Arc<CatalogRegistry>,
        store: Arc<VectorStore>,
        artifacts_dir: Option<PathBuf>,
    ) -> Self {
        ImportManager {
            registry,
            store,
            artifacts_dir,
            sessions: DashMap::new(),
        }
    }

    pub fn import(&self, payload: ImportPayload<'_>, overwrite: bool) -> Result<ImportOutcome, AppError> {
        match payload {
            ImportPayload::File(path) => {
                let definition = load_workflow_file(path)?;
                self.finish(definition, overwrite, None)
            }
            ImportPayload::Inline {
                content,
                content_type,
                source_name,
            } => {
                let definition = parse_inline(content, content_type, source_name)?;
                self.finish(definition, overwrite, Some(source_name.to_string()))
            }
        }
    }

    /// Start a chunked import session.
    pub fn begin_session(&self, content_type: &str, source_name: &str) -> Result<Uuid, AppError> {
        if SurfaceFormat::from_content_type(content_type).is_none() {
            return Err(unsupported_content_type(content_type));
        }
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            ImportSession {
                content_type: content_type.to_string(),
                source_name: source_name.to_string(),
                buffer: String::new(),
            },
        );
        debug!(session = %id, source = source_name, "import session opened");
        Ok(id)
    }

    pub fn append_chunk(&self, id: Uuid, chunk: &str) -> Result<(), AppError> {
        let mut session = self.sessions.get_mut(&id).ok_or_else(|| unknown_session(id))?;
        session.buffer.push_str(chunk);
        Ok(())
    }

    pub fn finalize_session(&self, id: Uuid, overwrite: bool) -> Result<ImportOutcome, AppError> {
        let (_, session) = self
            .sessions
            .remove(&id)
            .ok_or_else(|| unknown_session(id))?;
        let definition = parse_inline(&session.buffer, &session.content_type, &session.source_name)?;
        self.finish(definition, overwrite, Some(session.source_name))
    }

    pub fn abort_session(&self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn finish(
        &self,
        definition: WorkflowDefinition,
        overwrite: bool,
        inline_source: Option<String>,
    ) -> Result<ImportOutcome, AppError> {
        let name = definition.name.clone();
        let overwritten = self.registry.insert_workflow(definition.clone(), overwrite)?;

        if overwritten {
            // Stale description embedding and managed artifact go with the
            // old definition.
            self.store.delete(Namespace::Workflows, &name)?;
            self.remove_artifact(&name);
        }
        if inline_source.is_some() {
            self.write_artifact(&definition)?;
        }

        info!(workflow = %name, overwritten, "workflow imported");
        Ok(ImportOutcome { name, overwritten })
    }

    fn artifact_path(&self, name: &str) -> Option<PathBuf> {
        self.artifacts_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.yaml", name)))
    }

    fn write_artifact(&self, definition: &WorkflowDefinition) -> Result<(), AppError> {
        let Some(path) = self.artifact_path(&definition.name) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_yaml::to_string(definition)?;
        fs::write(&path, text)?;
        Ok(())
    }

    fn remove_artifact(&self, name: &str) {
        if let Some(path) = self.artifact_path(name) {
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

fn parse_inline(
    content: &str,
    content_type: &str,
    source_name: &str,
) -> Result<WorkflowDefinition, AppError> {
    let format = SurfaceFormat::from_content_type(content_type)
        .ok_or_else(|| unsupported_content_type(content_type))?;
    parse_workflow_str(content, format, source_name)
}

fn unsupported_content_type(content_type: &str) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("unsupported content_type '{}'", content_type),
    )
    .with_code("RTR-CAT-009")
}

fn unknown_session(id: Uuid) -> AppError {
    AppError::new(
        ErrorCategory::ValidationError,
        format!("unknown import session {}", id),
    )
    .with_code("RTR-CAT-010")
}
