//! Error firewall: validates outgoing tool calls against the scene
//! (mode, selection, existence), prepends corrective calls, clamps
//! out-of-range numeric parameters, and blocks calls that cannot be
//! repaired. Output is idempotent: validating the firewall's own output
//! changes nothing.

pub mod overrides;

use crate::core::catalog::ToolMetadata;
use crate::core::expansion::apply_side_effects;
use crate::core::expression::ExprValue;
use crate::core::scene::SceneContext;
use serde::Serialize;
use serde_json::{Number, Value};
use signalbox_types::{CorrectedToolCall, CorrectionReason, Mode};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// A call the firewall refused, with the rule that fired.
#[derive(Debug, Clone, Serialize)]
pub struct BlockedCall {
    pub tool: String,
    pub rule: String,
    pub message: String,
}

/// Validated call list plus what the firewall did to it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FirewallReport {
    pub calls: Vec<CorrectedToolCall>,
    pub blocked: Vec<BlockedCall>,
    pub applied_rules: Vec<String>,
}

/// Numeric clamp declared for a tool parameter.
#[derive(Debug, Clone)]
pub struct ClampRule {
    pub tool: String,
    pub param: String,
    pub min: f64,
    pub max: f64,
}

/// State the firewall tracks while walking a call list, so corrections
/// made for one call are visible to the next.
struct SimState {
    mode: Mode,
    has_selection: bool,
    object_count: usize,
}

impl SimState {
    fn from_scene(scene: &SceneContext) -> SimState {
        SimState {
            mode: scene.mode,
            has_selection: scene.topology.has_selection,
            object_count: scene.object_count(),
        }
    }

    fn absorb(&mut self, call: &CorrectedToolCall) {
        // Reuse the expansion simulation for the shared effects.
        let mut context = HashMap::new();
        context.insert(
            "current_mode".to_string(),
            ExprValue::Str(self.mode.as_str().to_string()),
        );
        context.insert(
            "has_selection".to_string(),
            ExprValue::from_bool(self.has_selection),
        );
        context.insert(
            "object_count".to_string(),
            ExprValue::Number(self.object_count as f64),
        );
        apply_side_effects(&mut context, &call.tool, &call.params);
        if let Some(ExprValue::Str(mode)) = context.get("current_mode") {
            self.mode = match mode.as_str() {
                "object" => Mode::Object,
                "edit" => Mode::Edit,
                "sculpt" => Mode::Sculpt,
                _ => self.mode,
            };
        }
        if let Some(value) = context.get("has_selection") {
            self.has_selection = *value != ExprValue::Number(0.0);
        }
        if let Some(ExprValue::Number(count)) = context.get("object_count") {
            self.object_count = *count as usize;
        }
    }
}

pub struct Firewall {
    clamp_rules: Vec<ClampRule>,
}

impl Default for Firewall {
    fn default() -> Self {
        Firewall::new(Vec::new())
    }
}

impl Firewall {
    pub fn new(clamp_rules: Vec<ClampRule>) -> Self {
        Firewall { clamp_rules }
    }

    /// Validate an ordered call list against the scene. Blocked calls are
    /// dropped and reported; auto-fix preludes are inserted in front of
    /// the call that needed them.
    pub fn validate(
        &self,
        calls: Vec<CorrectedToolCall>,
        scene: &SceneContext,
        tools: &HashMap<String, Arc<ToolMetadata>>,
    ) -> FirewallReport {
        let mut report = FirewallReport::default();
        let mut state = SimState::from_scene(scene);

        for mut call in calls {
            let metadata = tools.get(&call.tool);

            // Existence precondition: deleting with nothing in the scene
            // cannot be repaired, only refused.
            if call.tool == "object_delete" && state.object_count == 0 {
                let rule = "delete_no_object";
                report.blocked.push(BlockedCall {
                    tool: call.tool.clone(),
                    rule: rule.to_string(),
                    message: "cannot delete: the scene has no objects".to_string(),
                });
                note(&mut report.applied_rules, rule);
                continue;
            }

            // Mode precondition: prepend the switch instead of failing.
            if let Some(meta) = metadata {
                if !meta.mode_required.accepts(state.mode) {
                    if let Some(target) = meta.mode_required.target_mode() {
                        let rule = "mode_precondition";
                        let fix = CorrectedToolCall::new(
                            "system_set_mode",
                            serde_json::json!({"mode": target.as_str()})
                                .as_object()
                                .cloned()
                                .unwrap_or_default(),
                            call.session_id,
                            CorrectionReason::ModeFix,
                        );
                        state.absorb(&fix);
                        report.calls.push(fix);
                        note(&mut report.applied_rules, rule);
                    }
                }

                // Selection precondition: an edit-mode mesh operation on an
                // empty selection gets a select-all prelude.
                if meta.requires_selection && !state.has_selection {
                    let rule = "selection_precondition";
                    let fix = CorrectedToolCall::new(
                        "mesh_select_all",
                        serde_json::json!({"action": "select"})
                            .as_object()
                            .cloned()
                            .unwrap_or_default(),
                        call.session_id,
                        CorrectionReason::SelectionFix,
                    );
                    state.absorb(&fix);
                    report.calls.push(fix);
                    note(&mut report.applied_rules, rule);
                }
            }

            if self.clamp_params(&mut call) {
                if call.reason.is_none() {
                    call.reason = Some(CorrectionReason::Clamp);
                }
                note(&mut report.applied_rules, "range_clamp");
            }

            state.absorb(&call);
            report.calls.push(call);
        }

        report
    }

    /// Clamp declared numeric parameters in place. Returns whether
    /// anything changed.
    fn clamp_params(&self, call: &mut CorrectedToolCall) -> bool {
        let mut changed = false;
        for rule in &self.clamp_rules {
            if rule.tool != call.tool {
                continue;
            }
            let Some(value) = call.params.get(&rule.param).and_then(Value::as_f64) else {
                continue;
            };
            if value < rule.min || value > rule.max {
                let clamped = value.clamp(rule.min, rule.max);
                warn!(
                    tool = %call.tool,
                    param = %rule.param,
                    value,
                    clamped,
                    "parameter outside declared range; clamping"
                );
                if let Some(number) = Number::from_f64(clamped) {
                    call.params.insert(rule.param.clone(), Value::Number(number));
                    changed = true;
                }
            }
        }
        changed
    }
}

fn note(applied: &mut Vec<String>, rule: &str) {
    if !applied.iter().any(|r| r == rule) {
        applied.push(rule.to_string());
    }
}
