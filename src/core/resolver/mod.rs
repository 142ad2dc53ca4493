//! Three-tier parameter resolution: modifier values, learned mappings
//! from the vector store, and structured `needs_input` fallout. Client
//! resolutions are persisted back as learned mappings for future prompts.

use crate::core::cancel::CancelToken;
use crate::core::catalog::{ParamKind, ParameterSchema, WorkflowDefinition};
use crate::core::embedding::EmbeddingService;
use crate::core::error::AppError;
use crate::core::matching::tokenize;
use crate::core::vector_store::{VectorRecord, VectorStore};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Map, Number, Value};
use sha2::{Digest, Sha256};
use signalbox_types::{ErrorCategory, Namespace, ResolutionSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Full prompts up to this length are stored as context verbatim.
const FULL_PROMPT_LIMIT: usize = 500;
/// Minimum useful context length for the sentence-window strategy.
const CONTEXT_MIN: usize = 100;
/// Cap for the sentence-window strategy.
const CONTEXT_CAP: usize = 400;
/// Fixed window radius for the last-resort strategy.
const WINDOW_RADIUS: usize = 100;

/// Descriptor returned to the client for a parameter that needs input.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub hints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of resolving a workflow's parameters against a prompt.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolutionOutcome {
    pub resolved: Map<String, Value>,
    pub unresolved: Vec<UnresolvedParam>,
    pub sources: BTreeMap<String, ResolutionSource>,
}

impl ResolutionOutcome {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

pub struct ParameterResolver {
    service: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    relevance_threshold: f32,
    memory_threshold: f32,
    word_threshold: f32,
}

impl ParameterResolver {
    pub fn new(
        service: Arc<EmbeddingService>,
        store: Arc<VectorStore>,
        relevance_threshold: f32,
        memory_threshold: f32,
        word_threshold: f32,
    ) -> Self {
        ParameterResolver {
            service,
            store,
            relevance_threshold,
            memory_threshold,
            word_threshold,
        }
    }

    /// Resolve every non-computed parameter. Precedence per parameter:
    /// explicit client value, then modifier, then (for parameters the
    /// prompt addresses) a learned mapping or a `needs_input` entry, then
    /// the declared default.
    pub fn resolve(
        &self,
        prompt: &str,
        workflow: &WorkflowDefinition,
        modifiers: &Map<String, Value>,
        explicit: &Map<String, Value>,
        cancel: &CancelToken,
    ) -> Result<ResolutionOutcome, AppError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mut outcome = ResolutionOutcome::default();
        for (name, schema) in &workflow.parameters {
            if schema.is_computed() {
                // Computed parameters are materialised at expansion time
                // and are never unresolved.
                continue;
            }

            if let Some(value) = explicit.get(name) {
                self.accept(&mut outcome, schema, value.clone(), ResolutionSource::Explicit);
                continue;
            }
            if let Some(value) = modifiers.get(name) {
                self.accept(&mut outcome, schema, value.clone(), ResolutionSource::Modifier);
                continue;
            }

            if self.prompt_addresses(prompt, schema)? {
                if cancel.is_cancelled() {
                    return Err(cancelled());
                }
                if let Some(value) = self.lookup_learned(prompt, workflow, schema)? {
                    self.accept(
                        &mut outcome,
                        schema,
                        value,
                        ResolutionSource::LearnedMapping,
                    );
                    continue;
                }
                // The prompt talks about this parameter but nothing
                // resolves it; ask rather than guess the default.
                outcome.unresolved.push(self.describe(schema, None));
                continue;
            }

            if let Some(default) = &schema.default {
                self.accept(
                    &mut outcome,
                    schema,
                    default.clone(),
                    ResolutionSource::Default,
                );
            } else {
                outcome.unresolved.push(self.describe(schema, None));
            }
        }
        Ok(outcome)
    }

    /// Persist explicitly resolved client values as learned mappings.
    /// Computed parameters are never learned. Returns how many mappings
    /// were written.
    pub fn learn(
        &self,
        prompt: &str,
        workflow: &WorkflowDefinition,
        resolved: &Map<String, Value>,
        cancel: &CancelToken,
    ) -> Result<usize, AppError> {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mut records = Vec::new();
        for (name, value) in resolved {
            let Some(schema) = workflow.parameter(name) else {
                warn!(parameter = %name, "not learning unknown parameter");
                continue;
            };
            if schema.is_computed() {
                continue;
            }
            let context = self.context_for(prompt, schema);
            let vector = self.service.embed(&context)?;
            let mut digest = Sha256::new();
            digest.update(workflow.name.as_bytes());
            digest.update([0u8]);
            digest.update(name.as_bytes());
            digest.update([0u8]);
            digest.update(context.as_bytes());
            let id = hex::encode(digest.finalize());

            records.push(VectorRecord {
                id,
                namespace: Namespace::Parameters,
                vector: vector.as_ref().clone(),
                payload: json!({
                    "context": context,
                    "parameter_name": name,
                    "value": value,
                    "workflow_name": workflow.name,
                    "created_at": Utc::now().to_rfc3339(),
                    "usage_count": 0,
                })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            });
        }

        let written = records.len();
        if written > 0 {
            self.store.upsert(records)?;
            debug!(count = written, workflow = %workflow.name, "learned parameter mappings");
        }
        Ok(written)
    }

    fn accept(
        &self,
        outcome: &mut ResolutionOutcome,
        schema: &ParameterSchema,
        value: Value,
        source: ResolutionSource,
    ) {
        match validate_value(schema, value) {
            Ok(value) => {
                outcome.resolved.insert(schema.name.clone(), value);
                outcome.sources.insert(schema.name.clone(), source);
            }
            Err(message) => {
                outcome.unresolved.push(self.describe(schema, Some(message)));
            }
        }
    }

    fn describe(&self, schema: &ParameterSchema, error: Option<String>) -> UnresolvedParam {
        UnresolvedParam {
            name: schema.name.clone(),
            kind: schema.kind,
            range: schema.range,
            enum_options: schema.enum_values.clone(),
            default: schema.default.clone(),
            hints: schema.semantic_hints.clone(),
            error,
        }
    }

    /// Relevance gate: the hint appears literally, or some prompt word is
    /// semantically close to some hint. This is what makes cross-lingual
    /// detection work without exhaustive hint translations.
    fn prompt_addresses(&self, prompt: &str, schema: &ParameterSchema) -> Result<bool, AppError> {
        Ok(self.relevance(prompt, schema)? >= self.relevance_threshold)
    }

    fn relevance(&self, prompt: &str, schema: &ParameterSchema) -> Result<f32, AppError> {
        if schema.semantic_hints.is_empty() {
            return Ok(0.0);
        }
        let lowered = prompt.to_lowercase();
        for hint in &schema.semantic_hints {
            if lowered.contains(&hint.to_lowercase()) {
                return Ok(1.0);
            }
        }
        let mut best = 0.0f32;
        for token in tokenize(prompt) {
            for hint in &schema.semantic_hints {
                let similarity = self.service.similarity(&token, hint)?;
                if similarity > best {
                    best = similarity;
                }
            }
        }
        if best >= self.word_threshold {
            Ok(best)
        } else {
            Ok(0.0)
        }
    }

    fn lookup_learned(
        &self,
        prompt: &str,
        workflow: &WorkflowDefinition,
        schema: &ParameterSchema,
    ) -> Result<Option<Value>, AppError> {
        let context = self.context_for(prompt, schema);
        let vector = self.service.embed(&context)?;
        let filter = json!({
            "workflow_name": workflow.name,
            "parameter_name": schema.name,
        });
        let hits = self.store.search(
            Namespace::Parameters,
            &vector,
            1,
            self.memory_threshold,
            filter.as_object(),
        );
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };
        debug!(
            parameter = %schema.name,
            score = hit.score,
            "learned mapping reused"
        );

        let value = hit.payload.get("value").cloned();
        // Bump the usage counter; failure here is not worth failing the
        // resolution.
        let mut payload = hit.payload.clone();
        let used = payload
            .get("usage_count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        payload.insert("usage_count".to_string(), json!(used + 1));
        let record = VectorRecord {
            id: hit.id,
            namespace: Namespace::Parameters,
            vector: vector.as_ref().clone(),
            payload,
        };
        if let Err(err) = self.store.upsert(vec![record]) {
            warn!(error = %err, "failed to bump learned-mapping usage count");
        }
        Ok(value)
    }

    /// Context string used both for learned-mapping search and storage.
    fn context_for(&self, prompt: &str, schema: &ParameterSchema) -> String {
        let anchor = self.find_anchor(prompt, schema);
        extract_context(prompt, anchor)
    }

    /// Byte offset of the first literal hint, else of the prompt word most
    /// similar to any hint, else the prompt start.
    fn find_anchor(&self, prompt: &str, schema: &ParameterSchema) -> usize {
        let lowered = prompt.to_lowercase();
        for hint in &schema.semantic_hints {
            if let Some(position) = lowered.find(&hint.to_lowercase()) {
                return position;
            }
        }
        let mut best: Option<(f32, usize)> = None;
        for token in tokenize(prompt) {
            let Some(position) = lowered.find(&token) else {
                continue;
            };
            for hint in &schema.semantic_hints {
                if let Ok(similarity) = self.service.similarity(&token, hint) {
                    if best.map(|(b, _)| similarity > b).unwrap_or(true) {
                        best = Some((similarity, position));
                    }
                }
            }
        }
        best.map(|(_, position)| position).unwrap_or(0)
    }
}

fn cancelled() -> AppError {
    AppError::new(ErrorCategory::TimeoutError, "request cancelled").with_code("RTR-CAN-001")
}

/// Three-tier context extraction around an anchor position.
pub fn extract_context(prompt: &str, anchor: usize) -> String {
    let chars: Vec<char> = prompt.chars().collect();
    if chars.len() <= FULL_PROMPT_LIMIT {
        return prompt.to_string();
    }

    // Work in character space; the anchor arrives as a byte offset.
    let anchor_chars = prompt
        .char_indices()
        .take_while(|(offset, _)| *offset < anchor)
        .count();

    // Sentence containing the anchor plus one on each side.
    let boundaries: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c, '.' | '!' | '?' | '\n'))
        .map(|(position, _)| position)
        .collect();
    let mut starts = vec![0usize];
    starts.extend(boundaries.iter().map(|b| b + 1));
    let mut ends: Vec<usize> = boundaries.iter().map(|b| b + 1).collect();
    ends.push(chars.len());

    let sentence_of = |position: usize| -> usize {
        starts
            .iter()
            .zip(ends.iter())
            .position(|(start, end)| position >= *start && position < *end)
            .unwrap_or(0)
    };
    let index = sentence_of(anchor_chars.min(chars.len().saturating_sub(1)));
    let from = starts[index.saturating_sub(1)];
    let to = ends[(index + 1).min(ends.len() - 1)];
    let window: String = chars[from..to].iter().collect::<String>().trim().to_string();
    if window.chars().count() >= CONTEXT_MIN {
        return window.chars().take(CONTEXT_CAP).collect();
    }

    // Fixed window around the anchor.
    let from = anchor_chars.saturating_sub(WINDOW_RADIUS);
    let to = (anchor_chars + WINDOW_RADIUS).min(chars.len());
    chars[from..to].iter().collect()
}

/// Validate and normalise one value against a schema. Errors become
/// unresolved entries, not hard failures.
pub fn validate_value(schema: &ParameterSchema, value: Value) -> Result<Value, String> {
    match schema.kind {
        ParamKind::Float | ParamKind::Int => {
            let Some(number) = value.as_f64() else {
                return Err(format!(
                    "{}: expected a number, got {}",
                    schema.name,
                    short_type(&value)
                ));
            };
            let clamped = match schema.range {
                Some((min, max)) if number < min || number > max => {
                    let clamped = number.clamp(min, max);
                    warn!(
                        parameter = %schema.name,
                        value = number,
                        clamped,
                        "value outside declared range; clamping"
                    );
                    clamped
                }
                _ => number,
            };
            if schema.kind == ParamKind::Int {
                Ok(json!(clamped.round() as i64))
            } else {
                Ok(Number::from_f64(clamped)
                    .map(Value::Number)
                    .unwrap_or(Value::Null))
            }
        }
        ParamKind::Bool => match value {
            Value::Bool(_) => Ok(value),
            Value::Number(ref n) => Ok(json!(n.as_f64().unwrap_or(0.0) != 0.0)),
            other => Err(format!(
                "{}: expected a boolean, got {}",
                schema.name,
                short_type(&other)
            )),
        },
        ParamKind::String => match value {
            Value::String(_) => Ok(value),
            other => Err(format!(
                "{}: expected a string, got {}",
                schema.name,
                short_type(&other)
            )),
        },
        ParamKind::Enum => {
            let Some(options) = &schema.enum_values else {
                return Err(format!("{}: enum without declared values", schema.name));
            };
            let Some(text) = value.as_str() else {
                return Err(format!(
                    "{}: expected one of {:?}, got {}",
                    schema.name,
                    options,
                    short_type(&value)
                ));
            };
            let normalized = text.trim().trim_matches(['"', '\'']).to_lowercase();
            match options
                .iter()
                .find(|option| option.trim().to_lowercase() == normalized)
            {
                Some(canonical) => Ok(Value::String(canonical.clone())),
                None => Err(format!(
                    "{}: '{}' is not a valid option; valid options: {}",
                    schema.name,
                    text,
                    options.join(", ")
                )),
            }
        }
    }
}

fn short_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
