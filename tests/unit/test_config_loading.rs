use signalbox::core::config::{validate_config, ConfigLoader, RouterConfig};
use std::fs;

#[test]
fn defaults_match_documented_thresholds() {
    let config = RouterConfig::default();
    assert_eq!(config.relevance_threshold, 0.40);
    assert_eq!(config.memory_threshold, 0.85);
    assert_eq!(config.modifier_word_threshold, 0.65);
    assert_eq!(config.adaptation_semantic_threshold, 0.60);
    assert_eq!(config.confidence_high, 0.70);
    assert_eq!(config.confidence_medium, 0.50);
    assert_eq!(config.weights.keyword, 0.40);
    assert_eq!(config.weights.semantic, 0.40);
    assert_eq!(config.weights.pattern, 0.20);
    assert!(config.enable_firewall);
    assert!(config.enable_overrides);
    assert!(config.enable_workflow_adaptation);
}

#[test]
fn workspace_file_is_discovered() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("signalbox.toml"),
        r#"
relevance_threshold = 0.45
cache_ttl_seconds = 30

[paths]
workflows_dir = "defs/workflows"
tools_dir = "defs/tools"
store_dir = ".signalbox/store"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_or_default(dir.path()).unwrap();
    assert_eq!(config.relevance_threshold, 0.45);
    assert_eq!(config.cache_ttl_seconds, 30);
    assert_eq!(
        config.paths.workflows_dir.as_deref(),
        Some(std::path::Path::new("defs/workflows"))
    );
    // Unset knobs keep their defaults.
    assert_eq!(config.memory_threshold, 0.85);
}

#[test]
fn invalid_threshold_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("signalbox.toml"),
        "modifier_word_threshold = 3.0\n",
    )
    .unwrap();
    let err = ConfigLoader::load_or_default(dir.path()).unwrap_err();
    assert!(err.message.contains("modifier_word_threshold"));
}

#[test]
fn weight_overrides_survive_round_trip() {
    let toml = r#"
[weights]
keyword = 0.25
semantic = 0.55
pattern = 0.20
"#;
    let config: RouterConfig = toml::from_str(toml).unwrap();
    assert!(validate_config(&config).is_ok());
    assert_eq!(config.weights.semantic, 0.55);

    let serialized = toml::to_string(&config).unwrap();
    let reparsed: RouterConfig = toml::from_str(&serialized).unwrap();
    assert_eq!(reparsed.weights.keyword, 0.25);
}
