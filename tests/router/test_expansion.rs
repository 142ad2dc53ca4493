use serde_json::{json, Map};
use signalbox::core::catalog::{parse_workflow_str, SurfaceFormat, WorkflowDefinition};
use signalbox::core::embedding::{EmbeddingService, HashedEmbedder};
use signalbox::core::expansion::{ExpansionRequest, WorkflowExpander};
use signalbox::core::scene::SceneAnalyzer;
use signalbox_types::{ConfidenceLevel, CorrectionReason};
use std::sync::Arc;
use uuid::Uuid;

fn workflow(yaml: &str) -> WorkflowDefinition {
    parse_workflow_str(yaml, SurfaceFormat::Yaml, "test").unwrap()
}

fn expander() -> WorkflowExpander {
    WorkflowExpander::new(
        Arc::new(EmbeddingService::new(Arc::new(HashedEmbedder::default()), 1000)),
        0.6,
        true,
    )
}

fn scene() -> signalbox::core::scene::SceneContext {
    SceneAnalyzer::analyze_from(&json!({
        "mode": "OBJECT",
        "active_object": "Cube",
        "objects": {"Cube": {"dimensions": [1, 1, 1], "location": [0, 0, 0]}},
        "topology": {"total_verts": 8}
    }))
}

fn expand(
    wf: &WorkflowDefinition,
    prompt: &str,
    explicit: Map<String, serde_json::Value>,
    confidence: ConfidenceLevel,
) -> Vec<signalbox_types::CorrectedToolCall> {
    expander()
        .expand(&ExpansionRequest {
            workflow: wf,
            prompt,
            explicit: &explicit,
            modifiers: &Map::new(),
            confidence,
            scene: &scene(),
            session_id: Uuid::new_v4(),
        })
        .unwrap()
}

#[test]
fn calculate_and_var_forms_resolve() {
    let wf = workflow(
        r#"
name: wf
parameters:
  table_width:
    type: float
    default: 2.0
steps:
  - tool: object_add_cube
    params:
      size: "$CALCULATE(table_width / 2)"
      width: "$table_width"
      label: "plain string"
      nested:
        depth: "$CALCULATE(table_width * 2)"
      series: ["$table_width", "$CALCULATE(1 + 1)"]
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    assert_eq!(calls.len(), 1);
    let params = &calls[0].params;
    assert_eq!(params["size"], json!(1.0));
    assert_eq!(params["width"], json!(2.0));
    assert_eq!(params["label"], json!("plain string"));
    assert_eq!(params["nested"]["depth"], json!(4.0));
    assert_eq!(params["series"], json!([2.0, 2.0]));
    assert_eq!(calls[0].reason, Some(CorrectionReason::WorkflowStep));
}

// P4: a failing $CALCULATE passes the literal through unchanged.
// (Syntactically malformed expressions are already rejected at load; the
// runtime failures are unknown variables and type errors.)
#[test]
fn failing_calculate_is_fail_soft() {
    let wf = workflow(
        r#"
name: wf
steps:
  - tool: t
    params:
      value: "$CALCULATE(undefined_var * 2)"
      typed: "$CALCULATE('text' + 1)"
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    assert_eq!(calls[0].params["value"], json!("$CALCULATE(undefined_var * 2)"));
    assert_eq!(calls[0].params["typed"], json!("$CALCULATE('text' + 1)"));
}

// P3: a raising condition includes the step.
#[test]
fn failing_condition_is_fail_open() {
    let wf = workflow(
        r#"
name: wf
steps:
  - tool: kept_by_failure
    params: {}
    condition: "nonexistent_context_var > 1"
  - tool: dropped_by_condition
    params: {}
    condition: "1 > 2"
  - tool: kept_by_condition
    params: {}
    condition: "2 > 1"
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    let names: Vec<&str> = calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["kept_by_failure", "kept_by_condition"]);
}

// P11: a mode-setting step is visible to later conditions.
#[test]
fn simulated_side_effects_reach_later_conditions() {
    let wf = workflow(
        r#"
name: wf
steps:
  - tool: system_set_mode
    params: {mode: edit}
  - tool: edit_only_step
    params: {}
    condition: "current_mode == 'edit'"
  - tool: object_only_step
    params: {}
    condition: "current_mode == 'object'"
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    let names: Vec<&str> = calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["system_set_mode", "edit_only_step"]);
}

#[test]
fn object_creation_is_counted_by_conditions() {
    let wf = workflow(
        r#"
name: wf
steps:
  - tool: object_add_cube
    params: {}
  - tool: object_add_cube
    params: {}
  - tool: needs_three_objects
    params: {}
    condition: "object_count >= 3"
  - tool: needs_two_new_objects
    params: {}
    condition: "object_count >= 3"
"#,
    );
    // Scene starts with one object; two creations raise the count to 3.
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    assert_eq!(calls.len(), 4);
}

// Scenario 2 condensed: default angles keep the X-brace conditions false;
// explicit steep angles enable them.
#[test]
fn numeric_conditions_follow_parameters() {
    let yaml = r#"
name: picnic_table_workflow
parameters:
  leg_angle_left:
    type: float
    default: 0.32
  leg_angle_right:
    type: float
    default: -0.32
steps:
  - tool: top_build
    params: {}
  - tool: x_brace_left
    params: {angle: "$leg_angle_left"}
    optional: true
    disable_adaptation: true
    condition: "leg_angle_left > 0.5 or leg_angle_left < -0.5"
  - tool: x_brace_right
    params: {angle: "$leg_angle_right"}
    optional: true
    disable_adaptation: true
    condition: "leg_angle_right > 0.5 or leg_angle_right < -0.5"
"#;
    let wf = workflow(yaml);

    let defaults = expand(&wf, "simple table", Map::new(), ConfidenceLevel::Low);
    let names: Vec<&str> = defaults.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["top_build"]);

    let explicit = json!({"leg_angle_left": 1.0, "leg_angle_right": -1.0})
        .as_object()
        .cloned()
        .unwrap();
    let steep = expand(&wf, "table with X-shaped legs", explicit, ConfidenceLevel::High);
    let names: Vec<&str> = steep.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["top_build", "x_brace_left", "x_brace_right"]);
    assert_eq!(steep[1].params["angle"], json!(1.0));
}

#[test]
fn computed_parameters_feed_steps_and_conditions() {
    let wf = workflow(
        r#"
name: wf
parameters:
  table_width:
    type: float
    default: 2.0
  table_depth:
    type: float
    default: 1.5
  table_area:
    type: float
    computed: "table_width * table_depth"
    depends_on: [table_width, table_depth]
steps:
  - tool: size_report
    params: {area: "$table_area"}
    condition: "table_area > 1"
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].params["area"], json!(3.0));
}

#[test]
fn computed_cycle_fails_the_expansion() {
    let wf = workflow(
        r#"
name: wf
parameters:
  alpha:
    type: float
    computed: "beta + 1"
    depends_on: [beta]
  beta:
    type: float
    computed: "alpha + 1"
    depends_on: [alpha]
steps:
  - tool: t
    params: {}
"#,
    );
    let err = expander()
        .expand(&ExpansionRequest {
            workflow: &wf,
            prompt: "p",
            explicit: &Map::new(),
            modifiers: &Map::new(),
            confidence: ConfidenceLevel::High,
            scene: &scene(),
            session_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(err.message.contains("alpha"));
    assert!(err.message.contains("beta"));
}

#[test]
fn emitted_order_matches_declaration_order() {
    let wf = workflow(
        r#"
name: wf
steps:
  - tool: first
    params: {}
  - tool: second
    params: {}
  - tool: third
    params: {}
"#,
    );
    let calls = expand(&wf, "p", Map::new(), ConfidenceLevel::High);
    let names: Vec<&str> = calls.iter().map(|c| c.tool.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
}
