use crate::core::expression::ExprValue;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Apply a step's side effect to the condition context so later
/// conditions observe it: mode changes, selection changes, object
/// creation and deletion.
pub fn apply_side_effects(
    context: &mut HashMap<String, ExprValue>,
    tool: &str,
    params: &Map<String, Value>,
) {
    if tool == "system_set_mode" {
        if let Some(mode) = params.get("mode").and_then(Value::as_str) {
            context.insert(
                "current_mode".to_string(),
                ExprValue::Str(mode.to_lowercase()),
            );
        }
        return;
    }

    if tool == "mesh_select_all" {
        let deselect = params
            .get("action")
            .and_then(Value::as_str)
            .map(|action| action.eq_ignore_ascii_case("deselect"))
            .unwrap_or(false);
        context.insert("has_selection".to_string(), ExprValue::from_bool(!deselect));
        if deselect {
            for counter in ["selected_verts", "selected_edges", "selected_faces"] {
                context.insert(counter.to_string(), ExprValue::Number(0.0));
            }
        }
        return;
    }

    if creates_object(tool) {
        bump(context, "object_count", 1.0);
        return;
    }
    if tool == "object_delete" {
        bump(context, "object_count", -1.0);
    }
}

fn creates_object(tool: &str) -> bool {
    tool.starts_with("object_add_") || tool.starts_with("mesh_primitive_") || tool.ends_with("_add")
}

fn bump(context: &mut HashMap<String, ExprValue>, name: &str, delta: f64) {
    let current = match context.get(name) {
        Some(ExprValue::Number(n)) => *n,
        _ => 0.0,
    };
    context.insert(name.to_string(), ExprValue::Number((current + delta).max(0.0)));
}
