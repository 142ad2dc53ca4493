use crate::core::config::RouterConfig;
use crate::core::error::AppError;
use signalbox_types::ErrorCategory;

/// Check threshold ranges and weight sanity.
pub fn validate_config(config: &RouterConfig) -> Result<(), AppError> {
    let mut issues = Vec::new();

    let unit_ranged = [
        ("relevance_threshold", config.relevance_threshold),
        ("memory_threshold", config.memory_threshold),
        ("modifier_word_threshold", config.modifier_word_threshold),
        (
            "adaptation_semantic_threshold",
            config.adaptation_semantic_threshold,
        ),
        ("confidence_high", config.confidence_high),
        ("confidence_medium", config.confidence_medium),
    ];
    for (name, value) in unit_ranged {
        if !(0.0..=1.0).contains(&value) {
            issues.push(format!("{} must be in [0, 1], got {}", name, value));
        }
    }

    if config.confidence_medium > config.confidence_high {
        issues.push(format!(
            "confidence_medium {} must not exceed confidence_high {}",
            config.confidence_medium, config.confidence_high
        ));
    }

    let weights = [
        ("weights.keyword", config.weights.keyword),
        ("weights.semantic", config.weights.semantic),
        ("weights.pattern", config.weights.pattern),
    ];
    for (name, value) in weights {
        if value < 0.0 {
            issues.push(format!("{} must not be negative, got {}", name, value));
        }
    }
    if config.weights.keyword + config.weights.semantic + config.weights.pattern <= 0.0 {
        issues.push("matcher weights must not all be zero".to_string());
    }

    if config.max_workflow_steps == 0 {
        issues.push("max_workflow_steps must be >= 1".to_string());
    }
    if config.executor_timeout_ms == 0 {
        issues.push("executor_timeout_ms must be >= 1".to_string());
    }
    if config.embedding_cache_max == 0 {
        issues.push("embedding_cache_max must be >= 1".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(
            AppError::new(ErrorCategory::ValidationError, issues.join("; "))
                .with_code("RTR-CFG-003"),
        )
    }
}
