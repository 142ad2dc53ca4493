use crate::core::catalog::WorkflowDefinition;
use crate::core::embedding::EmbeddingService;
use crate::core::error::AppError;
use crate::core::matching::tokenize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Longest prompt n-gram compared against a modifier word.
const MAX_NGRAM: usize = 3;

/// The winning modifier phrase for a prompt.
#[derive(Debug, Clone)]
pub struct ExtractedModifier {
    pub phrase: String,
    pub overrides: Map<String, Value>,
    pub average_similarity: f32,
}

/// Extracts parameter overrides from YAML-declared modifier phrases via
/// per-word semantic matching and negative-signal rejection. At most one
/// phrase wins per prompt.
pub struct ModifierExtractor {
    service: Arc<EmbeddingService>,
    word_threshold: f32,
}

impl ModifierExtractor {
    pub fn new(service: Arc<EmbeddingService>, word_threshold: f32) -> Self {
        ModifierExtractor {
            service,
            word_threshold,
        }
    }

    pub fn extract(
        &self,
        prompt: &str,
        workflow: &WorkflowDefinition,
    ) -> Result<Option<ExtractedModifier>, AppError> {
        if workflow.modifiers.is_empty() {
            return Ok(None);
        }

        let lowered = prompt.to_lowercase();
        let ngrams = prompt_ngrams(prompt);
        if ngrams.is_empty() {
            return Ok(None);
        }

        let mut best: Option<ExtractedModifier> = None;
        // Declaration order is the deterministic tie-break: only a strictly
        // better average displaces the current winner.
        for (phrase, spec) in &workflow.modifiers {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            if words.is_empty() {
                continue;
            }
            let required = words.len().min(2);

            let mut similarities = Vec::new();
            for word in &words {
                if let Some(similarity) = self.best_word_match(word, &ngrams)? {
                    similarities.push(similarity);
                }
            }
            if similarities.len() < required {
                continue;
            }

            if spec
                .negative_signals
                .iter()
                .any(|signal| lowered.contains(&signal.to_lowercase()))
            {
                debug!(phrase = %phrase, "modifier rejected by negative signal");
                continue;
            }

            let average = similarities.iter().sum::<f32>() / similarities.len() as f32;
            let better = best
                .as_ref()
                .map(|current| average > current.average_similarity)
                .unwrap_or(true);
            if better {
                best = Some(ExtractedModifier {
                    phrase: phrase.clone(),
                    overrides: spec.overrides.clone(),
                    average_similarity: average,
                });
            }
        }

        if let Some(winner) = &best {
            debug!(
                phrase = %winner.phrase,
                similarity = winner.average_similarity,
                "modifier phrase selected"
            );
        }
        Ok(best)
    }

    /// Best similarity between one modifier word and any prompt n-gram,
    /// when it clears the per-word threshold.
    fn best_word_match(&self, word: &str, ngrams: &[String]) -> Result<Option<f32>, AppError> {
        let mut best: Option<f32> = None;
        for gram in ngrams {
            let similarity = self.service.similarity(word, gram)?;
            if similarity >= self.word_threshold
                && best.map(|b| similarity > b).unwrap_or(true)
            {
                best = Some(similarity);
            }
        }
        Ok(best)
    }
}

fn prompt_ngrams(prompt: &str) -> Vec<String> {
    let tokens = tokenize(prompt);
    let mut grams = Vec::new();
    for size in 1..=MAX_NGRAM.min(tokens.len()) {
        for window in tokens.windows(size) {
            grams.push(window.join(" "));
        }
    }
    grams
}
