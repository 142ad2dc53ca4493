use serde_json::json;
use signalbox::core::catalog::{parse_tool_str, SurfaceFormat, ToolMetadata};
use signalbox::core::firewall::{overrides::OverrideEngine, ClampRule, Firewall};
use signalbox::core::scene::{SceneAnalyzer, SceneContext};
use signalbox_types::{CorrectedToolCall, CorrectionReason};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

fn tool(yaml: &str) -> (String, Arc<ToolMetadata>) {
    let meta = parse_tool_str(yaml, SurfaceFormat::Yaml, "test").unwrap();
    (meta.name.clone(), Arc::new(meta))
}

fn tools() -> HashMap<String, Arc<ToolMetadata>> {
    [
        tool("name: mesh_extrude_region\nmode_required: edit\nrequires_selection: true\n"),
        tool("name: mesh_inset_faces\nmode_required: edit\nrequires_selection: true\n"),
        tool("name: object_delete\nmode_required: object\n"),
        tool("name: system_set_mode\n"),
        tool("name: mesh_select_all\nmode_required: edit\n"),
    ]
    .into_iter()
    .collect()
}

fn empty_scene() -> SceneContext {
    SceneAnalyzer::analyze_from(&json!({
        "mode": "OBJECT",
        "objects": {},
        "topology": {}
    }))
}

fn object_scene() -> SceneContext {
    SceneAnalyzer::analyze_from(&json!({
        "mode": "OBJECT",
        "active_object": "Cube",
        "objects": {"Cube": {"dimensions": [1, 1, 1], "location": [0, 0, 0]}},
        "topology": {"total_verts": 8}
    }))
}

fn call(tool: &str, params: serde_json::Value) -> CorrectedToolCall {
    CorrectedToolCall::intercepted(
        tool,
        params.as_object().cloned().unwrap_or_default(),
        Uuid::new_v4(),
    )
}

// Scenario 6: an extrude on an empty scene gets its preconditions
// repaired rather than being executed illegally.
#[test]
fn extrude_without_selection_gets_select_all_prelude() {
    let firewall = Firewall::default();
    let report = firewall.validate(
        vec![call("mesh_extrude_region", json!({"depth": 0.5}))],
        &object_scene(),
        &tools(),
    );
    let names: Vec<&str> = report.calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(
        names,
        vec!["system_set_mode", "mesh_select_all", "mesh_extrude_region"]
    );
    assert_eq!(report.calls[0].params["mode"], json!("edit"));
    assert_eq!(report.calls[1].params["action"], json!("select"));
    // The original call itself is unchanged.
    assert_eq!(report.calls[2].params["depth"], json!(0.5));
    assert_eq!(report.calls[2].reason, None);
}

#[test]
fn delete_without_objects_is_blocked_with_rule_name() {
    let firewall = Firewall::default();
    let report = firewall.validate(
        vec![call("object_delete", json!({}))],
        &empty_scene(),
        &tools(),
    );
    assert!(report.calls.is_empty());
    assert_eq!(report.blocked[0].rule, "delete_no_object");
}

// P12: the firewall is idempotent on its own output.
#[test]
fn firewall_output_is_a_fixed_point() {
    let firewall = Firewall::new(vec![ClampRule {
        tool: "mesh_extrude_region".to_string(),
        param: "depth".to_string(),
        min: 0.0,
        max: 1.0,
    }]);
    let scene = object_scene();
    let tools = tools();

    let first = firewall.validate(
        vec![call("mesh_extrude_region", json!({"depth": 5.0}))],
        &scene,
        &tools,
    );
    let second = firewall.validate(first.calls.clone(), &scene, &tools);
    let third = firewall.validate(second.calls.clone(), &scene, &tools);

    let names = |report: &signalbox::core::firewall::FirewallReport| {
        report
            .calls
            .iter()
            .map(|c| (c.tool.clone(), c.params.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(names(&first), names(&second));
    assert_eq!(names(&second), names(&third));
    assert_eq!(first.calls.last().unwrap().params["depth"], json!(1.0));
}

#[test]
fn clamp_marks_the_call_as_corrected() {
    let firewall = Firewall::new(vec![ClampRule {
        tool: "mesh_extrude_region".to_string(),
        param: "depth".to_string(),
        min: 0.0,
        max: 1.0,
    }]);
    let report = firewall.validate(
        vec![call("mesh_extrude_region", json!({"depth": -3.0}))],
        &object_scene(),
        &tools(),
    );
    let extrude = report
        .calls
        .iter()
        .find(|c| c.tool == "mesh_extrude_region")
        .unwrap();
    assert_eq!(extrude.params["depth"], json!(0.0));
    assert_eq!(extrude.reason, Some(CorrectionReason::Clamp));
}

#[test]
fn override_replacement_then_firewall_still_idempotent() {
    let engine = OverrideEngine::default();
    let firewall = Firewall::default();
    let tools = tools();
    let scene = SceneAnalyzer::analyze_from(&json!({
        "mode": "EDIT_MESH",
        "active_object": "Phone",
        "objects": {"Phone": {"dimensions": [1.5, 0.7, 0.08], "location": [0, 0, 0]}},
        "topology": {"selected_faces": 2}
    }));

    let params = json!({"depth": 0.4}).as_object().cloned().unwrap();
    let (_, replaced) = engine
        .apply("mesh_extrude_region", &params, &scene, Uuid::new_v4())
        .expect("phone pattern should fire");

    let first = firewall.validate(replaced, &scene, &tools);
    let second = firewall.validate(first.calls.clone(), &scene, &tools);
    let names: Vec<&str> = first.calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["mesh_inset_faces", "mesh_extrude_region"]);
    assert_eq!(
        names,
        second.calls.iter().map(|c| c.tool.as_str()).collect::<Vec<_>>()
    );
}
