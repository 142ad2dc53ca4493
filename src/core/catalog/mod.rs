//! Tool/workflow metadata loading and the in-process catalog registry.
//!
//! The registry is copy-on-reload: mutation builds a fresh snapshot and
//! swaps it atomically, so readers hold an immutable view for the length
//! of a request. Every swap bumps the snapshot epoch, which is the refresh
//! signal the semantic matcher uses to re-embed workflow descriptions.

mod import;
mod tool_meta;
pub mod workflow;

pub use import::{ImportManager, ImportOutcome, ImportPayload};
pub use tool_meta::{load_tool_file, parse_tool_str, ToolMetadata};
pub use workflow::{
    load_workflow_file, parse_workflow_str, ModifierSpec, ParamKind, ParameterSchema,
    SurfaceFormat, WorkflowDefinition, WorkflowStep,
};

use crate::core::error::AppError;
use indexmap::IndexMap;
use serde::Serialize;
use signalbox_types::ErrorCategory;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Immutable view of the loaded catalog.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    pub epoch: u64,
    pub workflows: IndexMap<String, Arc<WorkflowDefinition>>,
    pub tools: HashMap<String, Arc<ToolMetadata>>,
}

/// Result of a bulk (re)load.
#[derive(Debug, Default, Serialize)]
pub struct LoadReport {
    pub workflows_loaded: usize,
    pub tools_loaded: usize,
    pub errors: Vec<String>,
}

/// Registry health for `get_status`.
#[derive(Debug, Serialize)]
pub struct RegistryStats {
    pub epoch: u64,
    pub workflows: usize,
    pub tools: usize,
}

pub struct CatalogRegistry {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
    max_workflow_steps: usize,
}

impl CatalogRegistry {
    pub fn new(max_workflow_steps: usize) -> Self {
        CatalogRegistry {
            snapshot: RwLock::new(Arc::new(CatalogSnapshot::default())),
            max_workflow_steps,
        }
    }

    /// Current immutable snapshot; hold it for the duration of a request.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.snapshot.read().expect("registry lock poisoned"))
    }

    pub fn stats(&self) -> RegistryStats {
        let snapshot = self.snapshot();
        RegistryStats {
            epoch: snapshot.epoch,
            workflows: snapshot.workflows.len(),
            tools: snapshot.tools.len(),
        }
    }

    /// Discover and load every workflow and tool metadata file under the
    /// given roots. Per-file failures are collected, not fatal.
    pub fn load_roots(
        &self,
        workflows_root: Option<&Path>,
        tools_root: Option<&Path>,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        let mut workflows: IndexMap<String, Arc<WorkflowDefinition>> = IndexMap::new();
        let mut tools: HashMap<String, Arc<ToolMetadata>> = HashMap::new();

        if let Some(root) = workflows_root {
            for path in discover_documents(root) {
                match load_workflow_file(&path) {
                    Ok(definition) => {
                        if let Err(err) = self.check_step_limit(&definition) {
                            report.errors.push(err.to_string());
                            continue;
                        }
                        if workflows.contains_key(&definition.name) {
                            report.errors.push(format!(
                                "{}: duplicate workflow name '{}'",
                                path.display(),
                                definition.name
                            ));
                            continue;
                        }
                        workflows.insert(definition.name.clone(), Arc::new(definition));
                        report.workflows_loaded += 1;
                    }
                    Err(err) => report.errors.push(err.to_string()),
                }
            }
        }

        if let Some(root) = tools_root {
            for path in discover_documents(root) {
                match load_tool_file(&path) {
                    Ok(metadata) => {
                        if tools.contains_key(&metadata.name) {
                            report.errors.push(format!(
                                "{}: duplicate tool name '{}'",
                                path.display(),
                                metadata.name
                            ));
                            continue;
                        }
                        tools.insert(metadata.name.clone(), Arc::new(metadata));
                        report.tools_loaded += 1;
                    }
                    Err(err) => report.errors.push(err.to_string()),
                }
            }
        }

        self.swap(move |previous| CatalogSnapshot {
            epoch: previous.epoch + 1,
            workflows,
            tools,
        });
        info!(
            workflows = report.workflows_loaded,
            tools = report.tools_loaded,
            errors = report.errors.len(),
            "catalog reloaded"
        );
        for error in &report.errors {
            warn!(error = %error, "catalog load issue");
        }
        report
    }

    /// Insert one workflow. Conflicting names are rejected unless
    /// `overwrite` is set. Returns whether an existing entry was replaced.
    pub fn insert_workflow(
        &self,
        definition: WorkflowDefinition,
        overwrite: bool,
    ) -> Result<bool, AppError> {
        self.check_step_limit(&definition)?;
        let current = self.snapshot();
        let existed = current.workflows.contains_key(&definition.name);
        if existed && !overwrite {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "workflow '{}' already exists (pass overwrite to replace it)",
                    definition.name
                ),
            )
            .with_code("RTR-CAT-007"));
        }
        let name = definition.name.clone();
        self.swap(move |previous| {
            let mut workflows = previous.workflows.clone();
            workflows.insert(name, Arc::new(definition));
            CatalogSnapshot {
                epoch: previous.epoch + 1,
                workflows,
                tools: previous.tools.clone(),
            }
        });
        Ok(existed)
    }

    pub fn remove_workflow(&self, name: &str) -> bool {
        let existed = self.snapshot().workflows.contains_key(name);
        if existed {
            let name = name.to_string();
            self.swap(move |previous| {
                let mut workflows = previous.workflows.clone();
                workflows.shift_remove(&name);
                CatalogSnapshot {
                    epoch: previous.epoch + 1,
                    workflows,
                    tools: previous.tools.clone(),
                }
            });
        }
        existed
    }

    fn check_step_limit(&self, definition: &WorkflowDefinition) -> Result<(), AppError> {
        if definition.steps.len() > self.max_workflow_steps {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "workflow '{}' declares {} steps, limit is {}",
                    definition.name,
                    definition.steps.len(),
                    self.max_workflow_steps
                ),
            )
            .with_code("RTR-CAT-008"));
        }
        Ok(())
    }

    fn swap<F>(&self, build: F)
    where
        F: FnOnce(&CatalogSnapshot) -> CatalogSnapshot,
    {
        let mut guard = self.snapshot.write().expect("registry lock poisoned");
        let next = build(guard.as_ref());
        *guard = Arc::new(next);
    }
}

/// Recursively collect workflow/tool documents under a root.
fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            warn!(dir = %dir.display(), "cannot read catalog directory");
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if SurfaceFormat::from_extension(&path).is_some() {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}
