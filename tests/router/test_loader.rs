use signalbox::core::catalog::{
    parse_tool_str, parse_workflow_str, CatalogRegistry, ImportManager, ImportPayload,
    SurfaceFormat,
};
use signalbox::core::vector_store::{VectorRecord, VectorStore};
use signalbox_types::{ModeRequirement, Namespace};
use std::sync::Arc;

const YAML_WORKFLOW: &str = r#"
name: picnic_table_workflow
description: Build a picnic table with optional benches.
trigger_keywords: [picnic, table]
shape_patterns: [flat_slab]
parameters:
  table_width:
    type: float
    default: 2.0
    range: [0.5, 6.0]
    semantic_hints: [width, wide]
  leg_angle_left:
    type: float
    range: [-1.5, 1.5]
    semantic_hints: [angle, x-shaped, straight]
  surface:
    type: enum
    enum_values: [Smooth, Rough]
    default: Smooth
  table_area:
    type: float
    computed: "table_width * 1.5"
    depends_on: [table_width]
modifiers:
  "straight legs":
    leg_angle_left: 0
    negative_signals: [x-shaped]
steps:
  - tool: object_add_cube
    params:
      size: "$CALCULATE(table_width / 2)"
  - tool: bench_add
    params: {}
    optional: true
    tags: [bench]
    add_bench: true
"#;

const JSON_WORKFLOW: &str = r#"{
  "name": "picnic_table_workflow",
  "description": "Build a picnic table with optional benches.",
  "trigger_keywords": ["picnic", "table"],
  "shape_patterns": ["flat_slab"],
  "parameters": {
    "table_width": {
      "type": "float",
      "default": 2.0,
      "range": [0.5, 6.0],
      "semantic_hints": ["width", "wide"]
    },
    "leg_angle_left": {
      "type": "float",
      "range": [-1.5, 1.5],
      "semantic_hints": ["angle", "x-shaped", "straight"]
    },
    "surface": {
      "type": "enum",
      "enum_values": ["Smooth", "Rough"],
      "default": "Smooth"
    },
    "table_area": {
      "type": "float",
      "computed": "table_width * 1.5",
      "depends_on": ["table_width"]
    }
  },
  "modifiers": {
    "straight legs": {
      "leg_angle_left": 0,
      "negative_signals": ["x-shaped"]
    }
  },
  "steps": [
    {"tool": "object_add_cube", "params": {"size": "$CALCULATE(table_width / 2)"}},
    {"tool": "bench_add", "params": {}, "optional": true, "tags": ["bench"], "add_bench": true}
  ]
}"#;

// Both surface syntaxes decode into the same record.
#[test]
fn yaml_and_json_surfaces_agree() {
    let from_yaml = parse_workflow_str(YAML_WORKFLOW, SurfaceFormat::Yaml, "wf.yaml").unwrap();
    let from_json = parse_workflow_str(JSON_WORKFLOW, SurfaceFormat::Json, "wf.json").unwrap();

    assert_eq!(from_yaml.name, from_json.name);
    assert_eq!(from_yaml.trigger_keywords, from_json.trigger_keywords);
    assert_eq!(from_yaml.shape_patterns, from_json.shape_patterns);
    assert_eq!(
        from_yaml.parameters.keys().collect::<Vec<_>>(),
        from_json.parameters.keys().collect::<Vec<_>>()
    );
    assert_eq!(from_yaml.steps.len(), from_json.steps.len());
    assert_eq!(
        from_yaml.steps[1].filters.get("add_bench"),
        from_json.steps[1].filters.get("add_bench")
    );
    assert_eq!(
        from_yaml.modifiers["straight legs"].negative_signals,
        from_json.modifiers["straight legs"].negative_signals
    );
}

#[test]
fn every_declared_step_field_is_populated() {
    let workflow = parse_workflow_str(YAML_WORKFLOW, SurfaceFormat::Yaml, "wf.yaml").unwrap();
    let step = &workflow.steps[1];
    assert_eq!(step.tool, "bench_add");
    assert!(step.params.is_empty());
    assert!(step.optional);
    assert!(!step.disable_adaptation);
    assert_eq!(step.tags, vec!["bench"]);
    assert_eq!(step.condition, None);
    assert_eq!(step.description, None);
    assert_eq!(step.filters.get("add_bench"), Some(&true));
}

#[test]
fn computed_and_client_required_parameters_are_distinguished() {
    let workflow = parse_workflow_str(YAML_WORKFLOW, SurfaceFormat::Yaml, "wf.yaml").unwrap();
    assert!(workflow.parameters["table_area"].is_computed());
    assert!(!workflow.parameters["table_area"].is_client_required());
    assert!(workflow.parameters["leg_angle_left"].is_client_required());
    assert!(!workflow.parameters["table_width"].is_client_required());
}

#[test]
fn tool_metadata_round_trip() {
    let meta = parse_tool_str(
        r#"{"name": "object_delete", "category": "object", "mode_required": "object", "requires_selection": false, "sample_prompts": ["delete the cube"]}"#,
        SurfaceFormat::Json,
        "tool.json",
    )
    .unwrap();
    assert_eq!(meta.name, "object_delete");
    assert_eq!(meta.mode_required, ModeRequirement::Object);
    assert_eq!(meta.sample_prompts.len(), 1);
}

fn import_manager(store: Arc<VectorStore>) -> ImportManager {
    ImportManager::new(Arc::new(CatalogRegistry::new(200)), store, None)
}

#[test]
fn chunked_import_protocol() {
    let manager = import_manager(Arc::new(VectorStore::in_memory()));
    let session = manager.begin_session("yaml", "picnic.yaml").unwrap();
    for chunk in YAML_WORKFLOW.as_bytes().chunks(64) {
        manager
            .append_chunk(session, std::str::from_utf8(chunk).unwrap())
            .unwrap();
    }
    let outcome = manager.finalize_session(session, false).unwrap();
    assert_eq!(outcome.name, "picnic_table_workflow");
    assert!(!outcome.overwritten);

    // The session is gone; appending again must fail.
    assert!(manager.append_chunk(session, "tail").is_err());
}

#[test]
fn overwrite_deletes_stale_workflow_embedding() {
    let store = Arc::new(VectorStore::in_memory());
    store
        .upsert(vec![VectorRecord {
            id: "picnic_table_workflow".to_string(),
            namespace: Namespace::Workflows,
            vector: vec![1.0, 0.0],
            payload: serde_json::Map::new(),
        }])
        .unwrap();

    let manager = import_manager(Arc::clone(&store));
    let payload = || ImportPayload::Inline {
        content: YAML_WORKFLOW,
        content_type: "yaml",
        source_name: "picnic.yaml",
    };
    manager.import(payload(), false).unwrap();
    // First import: no conflict, the pre-seeded embedding survives.
    assert_eq!(store.stats().records["workflows"], 1);

    let outcome = manager.import(payload(), true).unwrap();
    assert!(outcome.overwritten);
    assert_eq!(store.stats().records["workflows"], 0);
}

#[test]
fn abort_chunked_session_discards_buffer() {
    let manager = import_manager(Arc::new(VectorStore::in_memory()));
    let session = manager.begin_session("json", "x.json").unwrap();
    manager.append_chunk(session, "{\"name\":").unwrap();
    assert!(manager.abort_session(session));
    assert_eq!(manager.open_sessions(), 0);
}
