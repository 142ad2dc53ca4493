use crate::core::catalog::{WorkflowDefinition, WorkflowStep};
use crate::core::embedding::EmbeddingService;
use crate::core::error::AppError;
use signalbox_types::ConfidenceLevel;
use tracing::debug;

/// Filter a workflow's steps by ensemble confidence.
///
/// HIGH keeps everything; MEDIUM keeps the core plus optional steps the
/// prompt asks for; LOW and NONE keep the core only. A step with
/// `disable_adaptation` is always core — its runtime `condition` decides,
/// not semantic filtering.
pub fn adapt_steps<'a>(
    workflow: &'a WorkflowDefinition,
    confidence: ConfidenceLevel,
    prompt: &str,
    service: &EmbeddingService,
    semantic_threshold: f32,
) -> Result<Vec<&'a WorkflowStep>, AppError> {
    let selected: Vec<&WorkflowStep> = match confidence {
        ConfidenceLevel::High => workflow.steps.iter().collect(),
        ConfidenceLevel::Medium => {
            let mut kept = Vec::new();
            for step in &workflow.steps {
                if step.is_core() || optional_step_requested(step, prompt, service, semantic_threshold)? {
                    kept.push(step);
                }
            }
            kept
        }
        ConfidenceLevel::Low | ConfidenceLevel::None => workflow.core_steps().collect(),
    };
    debug!(
        workflow = %workflow.name,
        confidence = %confidence,
        total = workflow.steps.len(),
        kept = selected.len(),
        "adapted step list"
    );
    Ok(selected)
}

/// Whether the prompt asks for an optional step, checked in order: tags,
/// then dynamic boolean filters, then description similarity.
fn optional_step_requested(
    step: &WorkflowStep,
    prompt: &str,
    service: &EmbeddingService,
    semantic_threshold: f32,
) -> Result<bool, AppError> {
    let lowered = prompt.to_lowercase();

    if !step.tags.is_empty() {
        return Ok(step
            .tags
            .iter()
            .any(|tag| lowered.contains(&tag.to_lowercase())));
    }

    if !step.filters.is_empty() {
        for (name, enabled) in &step.filters {
            let phrase = filter_phrase(name);
            let present = lowered.contains(&phrase);
            if (*enabled && present) || (!*enabled && !present) {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some(description) = &step.description {
        let similarity = service.similarity(description, prompt)?;
        return Ok(similarity >= semantic_threshold);
    }

    Ok(false)
}

/// `add_bench` / `include_backrest` style filter names read as prompt
/// phrases.
fn filter_phrase(name: &str) -> String {
    let stripped = name
        .strip_prefix("add_")
        .or_else(|| name.strip_prefix("include_"))
        .unwrap_or(name);
    stripped.replace('_', " ").to_lowercase()
}
