//! The supervisor pipeline: the composition root that wires the scene
//! analyzer, ensemble matcher, parameter resolver, expander, override
//! rules, and firewall into the two public entry points (`set_goal`,
//! `process_call`) plus `execute`, `import_workflow`, and `get_status`.

mod telemetry;

pub use telemetry::{MemorySink, TelemetryEvent, TelemetrySink, TracingSink};

use crate::core::cancel::CancelToken;
use crate::core::catalog::{
    CatalogRegistry, ImportManager, ImportOutcome, ImportPayload, RegistryStats,
};
use crate::core::config::RouterConfig;
use crate::core::embedding::{Embedder, EmbeddingService};
use crate::core::error::AppError;
use crate::core::executor::ExecutorChannel;
use crate::core::expansion::{ExpansionRequest, WorkflowExpander};
use crate::core::firewall::{overrides::OverrideEngine, BlockedCall, Firewall};
use crate::core::matching::{
    EnsembleMatcher, KeywordMatcher, Matcher, ModifierExtractor, PatternMatcher, SemanticMatcher,
};
use crate::core::resolver::{ParameterResolver, ResolutionOutcome, UnresolvedParam};
use crate::core::scene::SceneAnalyzer;
use crate::core::vector_store::{StoreStats, VectorStore};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use signalbox_types::{
    ConfidenceLevel, CorrectedToolCall, ErrorCategory, GoalStatus, ResolutionSource,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Response to `set_goal`.
#[derive(Debug, Clone, Serialize)]
pub struct GoalResponse {
    pub status: GoalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    pub confidence: ConfidenceLevel,
    pub resolved: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedParam>,
    pub resolution_sources: BTreeMap<String, ResolutionSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to `execute` and `process_call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow: Option<String>,
    pub calls: Vec<CorrectedToolCall>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<BlockedCall>,
    pub applied_rules: Vec<String>,
}

/// Matcher entry in the health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MatcherHealth {
    pub name: &'static str,
    pub weight: f32,
}

/// `get_status` payload.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub registry: RegistryStats,
    pub store: StoreStats,
    pub matchers: Vec<MatcherHealth>,
    pub embedding_backend: &'static str,
    pub embedding_cache_entries: usize,
    pub open_import_sessions: usize,
}

pub struct SupervisorPipeline {
    config: RouterConfig,
    registry: Arc<CatalogRegistry>,
    store: Arc<VectorStore>,
    embeddings: Arc<EmbeddingService>,
    analyzer: SceneAnalyzer,
    ensemble: EnsembleMatcher,
    resolver: ParameterResolver,
    expander: WorkflowExpander,
    firewall: Firewall,
    overrides: OverrideEngine,
    imports: ImportManager,
    telemetry: Arc<dyn TelemetrySink>,
    executor: Arc<dyn ExecutorChannel>,
}

impl SupervisorPipeline {
    /// Wire the pipeline. The embedder and executor are injected so tests
    /// stay hermetic; the store and embedding service become the shared
    /// process singletons.
    pub fn new(
        config: RouterConfig,
        executor: Arc<dyn ExecutorChannel>,
        embedder: Arc<dyn Embedder>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, AppError> {
        let store = Arc::new(match &config.paths.store_dir {
            Some(dir) => VectorStore::open_or_memory(dir),
            None => VectorStore::in_memory(),
        });
        let embeddings = Arc::new(EmbeddingService::new(embedder, config.embedding_cache_max));

        let registry = Arc::new(CatalogRegistry::new(config.max_workflow_steps));
        let report = registry.load_roots(
            config.paths.workflows_dir.as_deref(),
            config.paths.tools_dir.as_deref(),
        );
        for error in &report.errors {
            warn!(error = %error, "catalog issue at startup");
        }

        let analyzer = SceneAnalyzer::new(
            Arc::clone(&executor),
            Duration::from_secs(config.cache_ttl_seconds),
            Duration::from_millis(config.executor_timeout_ms),
        );

        let matchers: Vec<Arc<dyn Matcher>> = vec![
            Arc::new(KeywordMatcher::new(config.weights.keyword)),
            Arc::new(SemanticMatcher::new(
                Arc::clone(&embeddings),
                config.weights.semantic,
            )),
            Arc::new(PatternMatcher::new(config.weights.pattern)),
        ];
        let ensemble = EnsembleMatcher::new(
            matchers,
            ModifierExtractor::new(Arc::clone(&embeddings), config.modifier_word_threshold),
            config.confidence_high,
            config.confidence_medium,
        );

        let resolver = ParameterResolver::new(
            Arc::clone(&embeddings),
            Arc::clone(&store),
            config.relevance_threshold,
            config.memory_threshold,
            config.modifier_word_threshold,
        );
        let expander = WorkflowExpander::new(
            Arc::clone(&embeddings),
            config.adaptation_semantic_threshold,
            config.enable_workflow_adaptation,
        );

        let artifacts_dir = config
            .paths
            .workflows_dir
            .as_ref()
            .map(|dir| dir.join("imported"));
        let imports = ImportManager::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            artifacts_dir,
        );

        Ok(SupervisorPipeline {
            config,
            registry,
            store,
            embeddings,
            analyzer,
            ensemble,
            resolver,
            expander,
            firewall: Firewall::default(),
            overrides: OverrideEngine::default(),
            imports,
            telemetry,
            executor,
        })
    }

    pub fn registry(&self) -> &Arc<CatalogRegistry> {
        &self.registry
    }

    pub fn imports(&self) -> &ImportManager {
        &self.imports
    }

    /// Interactive goal endpoint. Returns `needs_input` with parameter
    /// descriptors until the client supplies everything; then `ready`.
    /// Expansion happens on `execute`, never here.
    pub async fn set_goal(
        &self,
        prompt: &str,
        resolved_params: Option<Map<String, Value>>,
        cancel: &CancelToken,
    ) -> Result<GoalResponse, AppError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let session_id = Uuid::new_v4();
        let scene = self.analyzer.analyze(cancel).await;
        let snapshot = self.registry.snapshot();

        let ensemble = self.ensemble.match_goal(prompt, &scene, &snapshot)?;
        let Some(workflow_name) = ensemble.workflow.clone() else {
            self.emit(session_id, "goal", prompt, None, None, &[], &[]);
            return Ok(GoalResponse {
                status: GoalStatus::NeedsInput,
                workflow: None,
                confidence: ConfidenceLevel::None,
                resolved: Map::new(),
                unresolved: Vec::new(),
                resolution_sources: BTreeMap::new(),
                message: Some("no workflow matched the goal".to_string()),
            });
        };
        let workflow = snapshot
            .workflows
            .get(&workflow_name)
            .cloned()
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::InternalError,
                    format!("matched workflow '{}' missing from snapshot", workflow_name),
                )
                .with_code("RTR-PIP-001")
            })?;

        let explicit = resolved_params.unwrap_or_default();
        let outcome = self
            .resolver
            .resolve(prompt, &workflow, &ensemble.modifiers, &explicit, cancel)?;

        self.emit(
            session_id,
            "goal",
            prompt,
            Some(&workflow_name),
            Some(ensemble.confidence),
            &[],
            &[],
        );

        if !outcome.is_complete() {
            let names: Vec<&str> = outcome.unresolved.iter().map(|p| p.name.as_str()).collect();
            return Ok(GoalResponse {
                status: GoalStatus::NeedsInput,
                workflow: Some(workflow_name),
                confidence: ensemble.confidence,
                resolved: outcome.resolved,
                unresolved: outcome.unresolved.clone(),
                resolution_sources: outcome.sources,
                message: Some(format!(
                    "additional input required for: {}",
                    names.join(", ")
                )),
            });
        }

        // Learning memory is written only on confirmed success, and only
        // for values the client supplied.
        let client_values: Map<String, Value> = explicit
            .iter()
            .filter(|(name, _)| {
                outcome.sources.get(name.as_str()) == Some(&ResolutionSource::Explicit)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        if !client_values.is_empty() {
            self.resolver
                .learn(prompt, &workflow, &client_values, cancel)?;
        }

        Ok(GoalResponse {
            status: GoalStatus::Ready,
            workflow: Some(workflow_name),
            confidence: ensemble.confidence,
            resolved: outcome.resolved,
            unresolved: Vec::new(),
            resolution_sources: outcome.sources,
            message: None,
        })
    }

    /// Expand a ready goal into the final, firewalled call sequence and
    /// hand it to the executor. Fails with `needs_input` semantics when
    /// parameters are still missing.
    pub async fn execute(
        &self,
        prompt: &str,
        resolved_params: Option<Map<String, Value>>,
        cancel: &CancelToken,
    ) -> Result<CallResponse, AppError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let session_id = Uuid::new_v4();
        let scene = self.analyzer.analyze(cancel).await;
        let snapshot = self.registry.snapshot();

        let ensemble = self.ensemble.match_goal(prompt, &scene, &snapshot)?;
        let workflow_name = ensemble.workflow.clone().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ResolutionError,
                "no workflow matched the goal",
            )
            .with_code("RTR-PIP-002")
        })?;
        let workflow = snapshot.workflows[&workflow_name].clone();

        let explicit = resolved_params.unwrap_or_default();
        let outcome: ResolutionOutcome =
            self.resolver
                .resolve(prompt, &workflow, &ensemble.modifiers, &explicit, cancel)?;
        if !outcome.is_complete() {
            let names: Vec<&str> = outcome.unresolved.iter().map(|p| p.name.as_str()).collect();
            return Err(AppError::new(
                ErrorCategory::ResolutionError,
                format!("cannot execute: unresolved parameters {}", names.join(", ")),
            )
            .with_code("RTR-PIP-003"));
        }

        let expanded = self.expander.expand(&ExpansionRequest {
            workflow: &workflow,
            prompt,
            explicit: &outcome.resolved,
            modifiers: &ensemble.modifiers,
            confidence: ensemble.confidence,
            scene: &scene,
            session_id,
        })?;

        let (calls, mut applied_rules) = self.apply_overrides(expanded, &scene, session_id);
        let report = if self.config.enable_firewall {
            self.firewall.validate(calls, &scene, &snapshot.tools)
        } else {
            crate::core::firewall::FirewallReport {
                calls,
                blocked: Vec::new(),
                applied_rules: Vec::new(),
            }
        };
        applied_rules.extend(report.applied_rules.clone());

        let emitted: Vec<String> = report.calls.iter().map(|c| c.tool.clone()).collect();
        self.emit(
            session_id,
            "execute",
            prompt,
            Some(&workflow_name),
            Some(ensemble.confidence),
            &applied_rules,
            &emitted,
        );

        if let Err(err) = self.executor.dispatch(&report.calls).await {
            warn!(error = %err, "executor dispatch failed; returning sequence anyway");
        }

        Ok(CallResponse {
            workflow: Some(workflow_name),
            calls: report.calls,
            blocked: report.blocked,
            applied_rules,
        })
    }

    /// Single-call interception: override rules may replace the call, the
    /// firewall may block it or prepend fixes.
    pub async fn process_call(
        &self,
        tool: &str,
        params: Map<String, Value>,
        cancel: &CancelToken,
    ) -> Result<CallResponse, AppError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        let session_id = Uuid::new_v4();
        let scene = self.analyzer.analyze(cancel).await;
        let snapshot = self.registry.snapshot();

        let intercepted = vec![CorrectedToolCall::intercepted(tool, params, session_id)];
        let (calls, mut applied_rules) = self.apply_overrides(intercepted, &scene, session_id);

        let report = if self.config.enable_firewall {
            self.firewall.validate(calls, &scene, &snapshot.tools)
        } else {
            crate::core::firewall::FirewallReport {
                calls,
                blocked: Vec::new(),
                applied_rules: Vec::new(),
            }
        };
        applied_rules.extend(report.applied_rules.clone());

        let emitted: Vec<String> = report.calls.iter().map(|c| c.tool.clone()).collect();
        self.emit(
            session_id,
            "call",
            tool,
            None,
            None,
            &applied_rules,
            &emitted,
        );

        if let Some(block) = report.blocked.first() {
            if report.calls.is_empty() {
                return Err(AppError::new(
                    ErrorCategory::FirewallBlock,
                    block.message.clone(),
                )
                .with_context(format!("rule {}", block.rule))
                .with_code("RTR-FWL-001"));
            }
        }

        Ok(CallResponse {
            workflow: None,
            calls: report.calls,
            blocked: report.blocked,
            applied_rules,
        })
    }

    pub fn import_workflow(
        &self,
        payload: ImportPayload<'_>,
        overwrite: bool,
    ) -> Result<ImportOutcome, AppError> {
        self.imports.import(payload, overwrite)
    }

    pub fn get_status(&self) -> StatusReport {
        StatusReport {
            registry: self.registry.stats(),
            store: self.store.stats(),
            matchers: self
                .ensemble
                .roster()
                .into_iter()
                .map(|(name, weight)| MatcherHealth { name, weight })
                .collect(),
            embedding_backend: self.embeddings.backend_name(),
            embedding_cache_entries: self.embeddings.cache_len(),
            open_import_sessions: self.imports.open_sessions(),
        }
    }

    fn apply_overrides(
        &self,
        calls: Vec<CorrectedToolCall>,
        scene: &crate::core::scene::SceneContext,
        session_id: Uuid,
    ) -> (Vec<CorrectedToolCall>, Vec<String>) {
        if !self.config.enable_overrides {
            return (calls, Vec::new());
        }
        let mut out = Vec::with_capacity(calls.len());
        let mut applied = Vec::new();
        for call in calls {
            match self
                .overrides
                .apply(&call.tool, &call.params, scene, session_id)
            {
                Some((rule, replacement)) => {
                    if !applied.contains(&rule) {
                        applied.push(rule);
                    }
                    out.extend(replacement);
                }
                None => out.push(call),
            }
        }
        (out, applied)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &self,
        session_id: Uuid,
        kind: &'static str,
        input: &str,
        workflow: Option<&str>,
        confidence: Option<ConfidenceLevel>,
        applied_rules: &[String],
        emitted: &[String],
    ) {
        self.telemetry.record(TelemetryEvent {
            timestamp: Utc::now(),
            session_id,
            kind,
            input: input.to_string(),
            workflow: workflow.map(str::to_string),
            confidence,
            applied_rules: applied_rules.to_vec(),
            emitted: emitted.to_vec(),
        });
        info!(kind, input, workflow = workflow.unwrap_or("-"), "pipeline decision");
    }
}

fn cancelled() -> AppError {
    AppError::new(ErrorCategory::TimeoutError, "request cancelled").with_code("RTR-CAN-001")
}
