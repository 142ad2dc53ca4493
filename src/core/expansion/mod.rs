//! Workflow expansion: parameter layering, computed resolution, step
//! adaptation, per-step conditions with side-effect simulation, and
//! `$CALCULATE`/`$var` resolution into an ordered tool-call list.

mod adapter;
mod simulate;

pub use adapter::adapt_steps;
pub use simulate::apply_side_effects;

use crate::core::catalog::WorkflowDefinition;
use crate::core::embedding::EmbeddingService;
use crate::core::error::AppError;
use crate::core::expression::{
    calculate_expression, resolve_computed_parameters, variable_reference, ComputedSpec,
    ExprValue, ExpressionEngine,
};
use crate::core::scene::SceneContext;
use serde_json::{Map, Value};
use signalbox_types::{ConfidenceLevel, CorrectedToolCall, CorrectionReason};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// One expansion request.
pub struct ExpansionRequest<'a> {
    pub workflow: &'a WorkflowDefinition,
    pub prompt: &'a str,
    /// Client-resolved and resolver-produced values; highest precedence.
    pub explicit: &'a Map<String, Value>,
    /// Modifier overrides from the ensemble result.
    pub modifiers: &'a Map<String, Value>,
    pub confidence: ConfidenceLevel,
    pub scene: &'a SceneContext,
    pub session_id: Uuid,
}

pub struct WorkflowExpander {
    service: Arc<EmbeddingService>,
    semantic_threshold: f32,
    adaptation_enabled: bool,
}

impl WorkflowExpander {
    pub fn new(
        service: Arc<EmbeddingService>,
        semantic_threshold: f32,
        adaptation_enabled: bool,
    ) -> Self {
        WorkflowExpander {
            service,
            semantic_threshold,
            adaptation_enabled,
        }
    }

    /// Expand a workflow into the ordered tool-call list.
    pub fn expand(&self, request: &ExpansionRequest<'_>) -> Result<Vec<CorrectedToolCall>, AppError> {
        let workflow = request.workflow;

        // Later layers win: defaults, then modifiers, then explicit.
        let mut all_params: Map<String, Value> = Map::new();
        for (name, schema) in &workflow.parameters {
            if let Some(default) = &schema.default {
                all_params.insert(name.clone(), default.clone());
            }
        }
        for (name, value) in request.modifiers {
            all_params.insert(name.clone(), value.clone());
        }
        for (name, value) in request.explicit {
            all_params.insert(name.clone(), value.clone());
        }

        // Computed parameters; a cycle is fatal for this expansion.
        let computed_specs: Vec<ComputedSpec> = workflow
            .parameters
            .values()
            .filter_map(|schema| {
                schema.computed.as_ref().map(|expr| ComputedSpec {
                    name: schema.name.clone(),
                    expr: expr.clone(),
                    depends_on: schema.depends_on.clone(),
                })
            })
            .collect();
        let mut initial: HashMap<String, ExprValue> = HashMap::new();
        for (name, value) in &all_params {
            if let Some(converted) = ExprValue::from_json(value) {
                initial.insert(name.clone(), converted);
            }
        }
        let computed = resolve_computed_parameters(&computed_specs, &initial)?;
        for (name, value) in &computed {
            all_params.entry(name.clone()).or_insert_with(|| value.to_json());
        }

        let confidence = if self.adaptation_enabled {
            request.confidence
        } else {
            ConfidenceLevel::High
        };
        let steps = adapt_steps(
            workflow,
            confidence,
            request.prompt,
            &self.service,
            self.semantic_threshold,
        )?;

        // Condition context: scene facts plus the final parameter set.
        let mut condition_context: HashMap<String, ExprValue> = computed;
        condition_context.insert(
            "current_mode".to_string(),
            ExprValue::Str(request.scene.mode.as_str().to_string()),
        );
        condition_context.insert(
            "has_selection".to_string(),
            ExprValue::from_bool(request.scene.topology.has_selection),
        );
        condition_context.insert(
            "object_count".to_string(),
            ExprValue::Number(request.scene.object_count() as f64),
        );
        condition_context.insert(
            "selected_verts".to_string(),
            ExprValue::Number(request.scene.topology.selected_verts as f64),
        );
        condition_context.insert(
            "selected_edges".to_string(),
            ExprValue::Number(request.scene.topology.selected_edges as f64),
        );
        condition_context.insert(
            "selected_faces".to_string(),
            ExprValue::Number(request.scene.topology.selected_faces as f64),
        );

        let mut calls = Vec::new();
        for step in steps {
            let mut engine = ExpressionEngine::new();
            engine.set_context(condition_context.clone());

            let include = match &step.condition {
                None => true,
                Some(condition) if condition.trim().is_empty() => true,
                Some(condition) => match engine.evaluate_as_bool(condition) {
                    Ok(result) => result,
                    Err(err) => {
                        // Fail-open: a missing context variable must not
                        // break the whole workflow.
                        warn!(
                            tool = %step.tool,
                            condition = %condition,
                            error = %err,
                            "condition failed; including step"
                        );
                        true
                    }
                },
            };

            if include {
                let params = resolve_params(&step.params, &all_params, &engine);
                calls.push(CorrectedToolCall::new(
                    step.tool.clone(),
                    params,
                    request.session_id,
                    CorrectionReason::WorkflowStep,
                ));
            }

            // Simulated whether or not the step was emitted, so later
            // conditions observe the declared sequence.
            apply_side_effects(&mut condition_context, &step.tool, &step.params);
        }

        debug!(
            workflow = %workflow.name,
            calls = calls.len(),
            confidence = %confidence,
            "workflow expanded"
        );
        Ok(calls)
    }
}

/// Resolve `$CALCULATE(...)` and `$var` forms in step params, recursing
/// through lists and maps. Failures are fail-soft: the literal value
/// passes through.
fn resolve_params(
    params: &Map<String, Value>,
    all_params: &Map<String, Value>,
    engine: &ExpressionEngine,
) -> Map<String, Value> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), resolve_value(value, all_params, engine)))
        .collect()
}

fn resolve_value(value: &Value, all_params: &Map<String, Value>, engine: &ExpressionEngine) -> Value {
    match value {
        Value::String(text) => {
            if let Some(expr) = calculate_expression(text) {
                match engine.evaluate(expr) {
                    Ok(result) => result.to_json(),
                    Err(err) => {
                        warn!(expression = %text, error = %err, "$CALCULATE failed; passing literal through");
                        value.clone()
                    }
                }
            } else if let Some(name) = variable_reference(text) {
                match all_params.get(name) {
                    Some(resolved) => resolved.clone(),
                    None => {
                        warn!(variable = %text, "unknown $var; passing literal through");
                        value.clone()
                    }
                }
            } else {
                value.clone()
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, all_params, engine))
                .collect(),
        ),
        Value::Object(map) => Value::Object(resolve_params(map, all_params, engine)),
        other => other.clone(),
    }
}
