use signalbox::core::catalog::{parse_workflow_str, SurfaceFormat, WorkflowDefinition};
use signalbox::core::embedding::{EmbeddingService, HashedEmbedder, StaticEmbedder};
use signalbox::core::matching::ModifierExtractor;
use std::sync::Arc;

const WORKFLOW: &str = r#"
name: picnic_table_workflow
parameters:
  leg_angle_left:
    type: float
    range: [-1.5, 1.5]
  leg_angle_right:
    type: float
    range: [-1.5, 1.5]
  bench_count:
    type: int
    default: 0
modifiers:
  "straight legs":
    leg_angle_left: 0
    leg_angle_right: 0
    negative_signals: [x-shaped, crossed]
  "with benches":
    bench_count: 2
steps:
  - tool: t
    params: {}
"#;

fn workflow() -> WorkflowDefinition {
    parse_workflow_str(WORKFLOW, SurfaceFormat::Yaml, "test").unwrap()
}

fn hashed_extractor() -> ModifierExtractor {
    ModifierExtractor::new(
        Arc::new(EmbeddingService::new(Arc::new(HashedEmbedder::default()), 1000)),
        0.65,
    )
}

// Scenario: "simple table with straight legs" matches "straight legs"
// with 2/2 word matches and overrides both angles.
#[test]
fn literal_match_applies_overrides() {
    let winner = hashed_extractor()
        .extract("simple table with straight legs", &workflow())
        .unwrap()
        .expect("modifier should match");
    assert_eq!(winner.phrase, "straight legs");
    assert_eq!(winner.overrides["leg_angle_left"], serde_json::json!(0));
    assert_eq!(winner.overrides["leg_angle_right"], serde_json::json!(0));
}

#[test]
fn negative_signal_rejects_otherwise_matching_phrase() {
    let extractor = hashed_extractor();
    let result = extractor
        .extract("table with straight legs, x-shaped", &workflow())
        .unwrap();
    assert!(result.is_none(), "x-shaped must veto the phrase");

    let result = extractor
        .extract("table with CROSSED straight legs", &workflow())
        .unwrap();
    assert!(result.is_none(), "negative signals are case-insensitive");
}

// P7: at most one phrase wins even when several match.
#[test]
fn single_winner_across_phrases() {
    let winner = hashed_extractor()
        .extract("straight legs and with benches please", &workflow())
        .unwrap()
        .expect("one phrase should win");
    let applies_angles = winner.overrides.contains_key("leg_angle_left");
    let applies_benches = winner.overrides.contains_key("bench_count");
    assert!(
        applies_angles ^ applies_benches,
        "exactly one override set may apply, got {:?}",
        winner.overrides
    );
}

#[test]
fn multi_word_phrase_requires_two_matches() {
    let result = hashed_extractor()
        .extract("table with nice legs", &workflow())
        .unwrap();
    assert!(result.is_none(), "one matched word out of two is not enough");
}

// Cross-lingual matching via the embedding space: the Spanish prompt has
// no literal overlap with the declared phrase.
#[test]
fn cross_lingual_match_through_embeddings() {
    let dim = 64;
    let basis = |index: usize| {
        let mut v = vec![0.0f32; dim];
        v[index] = 1.0;
        v
    };
    let embedder = StaticEmbedder::new(dim)
        .pin("straight", basis(0))
        .pin("rectas", basis(0))
        .pin("legs", basis(1))
        .pin("patas", basis(1))
        .pin("mesa", basis(2))
        .pin("con", basis(3))
        .pin("una", basis(4))
        .pin("benches", basis(5))
        .pin("with", basis(6));
    let extractor = ModifierExtractor::new(
        Arc::new(EmbeddingService::new(Arc::new(embedder), 1000)),
        0.65,
    );

    let winner = extractor
        .extract("una mesa con patas rectas", &workflow())
        .unwrap()
        .expect("cross-lingual match should succeed");
    assert_eq!(winner.phrase, "straight legs");
    assert!((winner.average_similarity - 1.0).abs() < 1e-6);
}

#[test]
fn negative_signals_never_leak_as_parameters() {
    let winner = hashed_extractor()
        .extract("table with straight legs", &workflow())
        .unwrap()
        .unwrap();
    assert!(!winner.overrides.contains_key("negative_signals"));
}
