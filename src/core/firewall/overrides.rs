//! Pattern-driven override rules: replace a call with a short sequence
//! better suited to the detected scene shape.

use crate::core::scene::SceneContext;
use serde_json::{Map, Value};
use signalbox_types::{CorrectedToolCall, CorrectionReason};
use tracing::debug;
use uuid::Uuid;

/// One step of a replacement sequence.
#[derive(Debug, Clone)]
pub struct ReplacementStep {
    pub tool: String,
    pub params: Map<String, Value>,
    /// Merge the original call's params over this step's params.
    pub inherit_params: bool,
}

/// A replace-action rule: fires when the tool is called while the scene
/// matches the named shape pattern.
#[derive(Debug, Clone)]
pub struct OverrideRule {
    pub name: String,
    pub tool: String,
    pub scene_pattern: String,
    pub replacement: Vec<ReplacementStep>,
}

pub struct OverrideEngine {
    rules: Vec<OverrideRule>,
}

impl Default for OverrideEngine {
    fn default() -> Self {
        OverrideEngine::new(default_rules())
    }
}

impl OverrideEngine {
    pub fn new(rules: Vec<OverrideRule>) -> Self {
        OverrideEngine { rules }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Replace the call when a rule matches the scene pattern. Returns the
    /// fired rule name and the substituted sequence.
    pub fn apply(
        &self,
        tool: &str,
        params: &Map<String, Value>,
        scene: &SceneContext,
        session_id: Uuid,
    ) -> Option<(String, Vec<CorrectedToolCall>)> {
        let pattern = scene.pattern()?;
        let rule = self
            .rules
            .iter()
            .find(|rule| rule.tool == tool && rule.scene_pattern == pattern)?;

        let calls = rule
            .replacement
            .iter()
            .map(|step| {
                let mut merged = step.params.clone();
                if step.inherit_params {
                    for (key, value) in params {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                CorrectedToolCall::new(
                    step.tool.clone(),
                    merged,
                    session_id,
                    CorrectionReason::PatternReplace,
                )
                .replacing(tool)
            })
            .collect();
        debug!(rule = %rule.name, tool, pattern, "override rule fired");
        Some((rule.name.clone(), calls))
    }
}

/// Built-in override set. An extrude on a phone-proportioned object reads
/// as "raise the screen area": inset first so the rim survives.
fn default_rules() -> Vec<OverrideRule> {
    vec![OverrideRule {
        name: "extrude_phone_inset".to_string(),
        tool: "mesh_extrude_region".to_string(),
        scene_pattern: "phone_like".to_string(),
        replacement: vec![
            ReplacementStep {
                tool: "mesh_inset_faces".to_string(),
                params: serde_json::json!({"thickness": 0.02})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                inherit_params: false,
            },
            ReplacementStep {
                tool: "mesh_extrude_region".to_string(),
                params: Map::new(),
                inherit_params: true,
            },
        ],
    }]
}
