use crate::core::catalog::CatalogSnapshot;
use crate::core::error::AppError;
use crate::core::matching::{tokenize, MatchCandidate, Matcher};
use crate::core::scene::SceneContext;
use std::collections::HashSet;

/// Case-insensitive trigger-keyword matcher. Confidence is the fraction
/// of a workflow's keywords present in the prompt.
pub struct KeywordMatcher {
    weight: f32,
}

impl KeywordMatcher {
    pub fn new(weight: f32) -> Self {
        KeywordMatcher { weight }
    }
}

impl Matcher for KeywordMatcher {
    fn name(&self) -> &'static str {
        "keyword"
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn match_prompt(
        &self,
        prompt: &str,
        _scene: &SceneContext,
        snapshot: &CatalogSnapshot,
    ) -> Result<Vec<MatchCandidate>, AppError> {
        let lowered = prompt.to_lowercase();
        let tokens: HashSet<String> = tokenize(prompt).into_iter().collect();

        let mut candidates = Vec::new();
        for (name, workflow) in &snapshot.workflows {
            if workflow.trigger_keywords.is_empty() {
                continue;
            }
            let matched = workflow
                .trigger_keywords
                .iter()
                .filter(|keyword| {
                    let keyword = keyword.to_lowercase();
                    if keyword.contains(char::is_whitespace) {
                        lowered.contains(&keyword)
                    } else {
                        tokens.contains(&keyword)
                    }
                })
                .count();
            if matched > 0 {
                candidates.push(MatchCandidate {
                    workflow: name.clone(),
                    score: matched as f32 / workflow.trigger_keywords.len() as f32,
                });
            }
        }
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.workflow.cmp(&b.workflow))
        });
        Ok(candidates)
    }
}
