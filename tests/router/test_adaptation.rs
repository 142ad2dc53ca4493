use signalbox::core::catalog::{parse_workflow_str, SurfaceFormat, WorkflowDefinition};
use signalbox::core::embedding::{EmbeddingService, HashedEmbedder};
use signalbox::core::expansion::adapt_steps;
use signalbox_types::ConfidenceLevel;
use std::sync::Arc;

const WORKFLOW: &str = r#"
name: picnic_table_workflow
steps:
  - tool: top_build
    params: {}
  - tool: legs_build
    params: {}
  - tool: x_brace_left
    params: {}
    optional: true
    disable_adaptation: true
    condition: "leg_angle_left > 0.5 or leg_angle_left < -0.5"
  - tool: bench_left
    params: {}
    optional: true
    tags: [bench, seating]
  - tool: bench_right
    params: {}
    optional: true
    tags: [bench, seating]
  - tool: umbrella_hole
    params: {}
    optional: true
    add_umbrella_hole: true
"#;

fn workflow() -> WorkflowDefinition {
    parse_workflow_str(WORKFLOW, SurfaceFormat::Yaml, "test").unwrap()
}

fn service() -> EmbeddingService {
    EmbeddingService::new(Arc::new(HashedEmbedder::default()), 1000)
}

fn tools(steps: &[&signalbox::core::catalog::WorkflowStep]) -> Vec<String> {
    steps.iter().map(|s| s.tool.clone()).collect()
}

// P10: HIGH keeps everything.
#[test]
fn high_confidence_keeps_all_steps() {
    let wf = workflow();
    let steps = adapt_steps(&wf, ConfidenceLevel::High, "whatever", &service(), 0.6).unwrap();
    assert_eq!(steps.len(), wf.steps.len());
}

// P10: LOW output is a subset of the core, and pinned steps survive.
#[test]
fn low_confidence_is_core_only_with_pinned_steps() {
    let wf = workflow();
    let steps = adapt_steps(
        &wf,
        ConfidenceLevel::Low,
        "simple table with benches",
        &service(),
        0.6,
    )
    .unwrap();
    let names = tools(&steps);
    assert_eq!(names, vec!["top_build", "legs_build", "x_brace_left"]);
    // The disable_adaptation step stays even though it is optional; its
    // runtime condition decides, not semantic filtering.
    assert!(names.contains(&"x_brace_left".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("bench")));
}

#[test]
fn none_confidence_matches_low() {
    let wf = workflow();
    let low = tools(&adapt_steps(&wf, ConfidenceLevel::Low, "x", &service(), 0.6).unwrap());
    let none = tools(&adapt_steps(&wf, ConfidenceLevel::None, "x", &service(), 0.6).unwrap());
    assert_eq!(low, none);
}

#[test]
fn medium_includes_tagged_steps_the_prompt_asks_for() {
    let wf = workflow();
    let steps = adapt_steps(
        &wf,
        ConfidenceLevel::Medium,
        "picnic table with seating",
        &service(),
        0.6,
    )
    .unwrap();
    let names = tools(&steps);
    assert!(names.contains(&"bench_left".to_string()));
    assert!(names.contains(&"bench_right".to_string()));
    assert!(!names.contains(&"umbrella_hole".to_string()));
}

#[test]
fn medium_includes_filter_named_steps() {
    let wf = workflow();
    let steps = adapt_steps(
        &wf,
        ConfidenceLevel::Medium,
        "table with an umbrella hole in the middle",
        &service(),
        0.6,
    )
    .unwrap();
    assert!(tools(&steps).contains(&"umbrella_hole".to_string()));
}

#[test]
fn medium_without_cues_reduces_to_core() {
    let wf = workflow();
    let steps = adapt_steps(&wf, ConfidenceLevel::Medium, "picnic table", &service(), 0.6).unwrap();
    let names = tools(&steps);
    assert_eq!(names, vec!["top_build", "legs_build", "x_brace_left"]);
}

// P10 subset law: every LOW step appears in the MEDIUM set, every MEDIUM
// step in the HIGH set.
#[test]
fn adaptation_levels_are_nested() {
    let wf = workflow();
    let prompt = "table with benches";
    let service = service();
    let low = tools(&adapt_steps(&wf, ConfidenceLevel::Low, prompt, &service, 0.6).unwrap());
    let medium = tools(&adapt_steps(&wf, ConfidenceLevel::Medium, prompt, &service, 0.6).unwrap());
    let high = tools(&adapt_steps(&wf, ConfidenceLevel::High, prompt, &service, 0.6).unwrap());
    for name in &low {
        assert!(medium.contains(name));
    }
    for name in &medium {
        assert!(high.contains(name));
    }
}
