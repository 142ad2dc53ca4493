mod loader;
mod validation;

pub use loader::ConfigLoader;
pub use validation::validate_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Matcher ensemble weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MatcherWeights {
    #[serde(default = "default_keyword_weight")]
    pub keyword: f32,
    #[serde(default = "default_semantic_weight")]
    pub semantic: f32,
    #[serde(default = "default_pattern_weight")]
    pub pattern: f32,
}

impl Default for MatcherWeights {
    fn default() -> Self {
        MatcherWeights {
            keyword: default_keyword_weight(),
            semantic: default_semantic_weight(),
            pattern: default_pattern_weight(),
        }
    }
}

/// Filesystem layout: workflow/tool document roots and the vector store
/// directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflows_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,
}

/// Main router configuration loaded from signalbox.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Minimum relevance for a parameter to be considered addressable by
    /// the prompt.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,

    /// Minimum similarity to reuse a learned mapping.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold: f32,

    /// Per-word semantic match threshold for modifier extraction.
    #[serde(default = "default_modifier_word_threshold")]
    pub modifier_word_threshold: f32,

    /// Fallback similarity for optional-step inclusion at MEDIUM.
    #[serde(default = "default_adaptation_semantic_threshold")]
    pub adaptation_semantic_threshold: f32,

    #[serde(default = "default_confidence_high")]
    pub confidence_high: f32,

    #[serde(default = "default_confidence_medium")]
    pub confidence_medium: f32,

    #[serde(default)]
    pub weights: MatcherWeights,

    /// Scene context cache TTL.
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    #[serde(default = "default_max_workflow_steps")]
    pub max_workflow_steps: usize,

    #[serde(default = "default_true")]
    pub enable_firewall: bool,

    #[serde(default = "default_true")]
    pub enable_overrides: bool,

    #[serde(default = "default_true")]
    pub enable_workflow_adaptation: bool,

    /// Deadline for one executor query, in milliseconds.
    #[serde(default = "default_executor_timeout_ms")]
    pub executor_timeout_ms: u64,

    #[serde(default = "default_embedding_cache_max")]
    pub embedding_cache_max: usize,

    #[serde(default)]
    pub paths: PathsConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            relevance_threshold: default_relevance_threshold(),
            memory_threshold: default_memory_threshold(),
            modifier_word_threshold: default_modifier_word_threshold(),
            adaptation_semantic_threshold: default_adaptation_semantic_threshold(),
            confidence_high: default_confidence_high(),
            confidence_medium: default_confidence_medium(),
            weights: MatcherWeights::default(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_workflow_steps: default_max_workflow_steps(),
            enable_firewall: true,
            enable_overrides: true,
            enable_workflow_adaptation: true,
            executor_timeout_ms: default_executor_timeout_ms(),
            embedding_cache_max: default_embedding_cache_max(),
            paths: PathsConfig::default(),
        }
    }
}

fn default_relevance_threshold() -> f32 {
    0.40
}

fn default_memory_threshold() -> f32 {
    0.85
}

fn default_modifier_word_threshold() -> f32 {
    0.65
}

fn default_adaptation_semantic_threshold() -> f32 {
    0.60
}

fn default_confidence_high() -> f32 {
    0.70
}

fn default_confidence_medium() -> f32 {
    0.50
}

fn default_keyword_weight() -> f32 {
    0.40
}

fn default_semantic_weight() -> f32 {
    0.40
}

fn default_pattern_weight() -> f32 {
    0.20
}

fn default_cache_ttl_seconds() -> u64 {
    5
}

fn default_max_workflow_steps() -> usize {
    200
}

fn default_true() -> bool {
    true
}

fn default_executor_timeout_ms() -> u64 {
    2_000
}

fn default_embedding_cache_max() -> usize {
    10_000
}
