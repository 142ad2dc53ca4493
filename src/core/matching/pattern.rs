use crate::core::catalog::CatalogSnapshot;
use crate::core::error::AppError;
use crate::core::matching::{MatchCandidate, Matcher};
use crate::core::scene::SceneContext;

/// Scene-shape matcher: workflows declaring a `shape_patterns` entry that
/// matches the active object's derived pattern get a full-score vote.
pub struct PatternMatcher {
    weight: f32,
}

impl PatternMatcher {
    pub fn new(weight: f32) -> Self {
        PatternMatcher { weight }
    }
}

impl Matcher for PatternMatcher {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn weight(&self) -> f32 {
        self.weight
    }

    fn match_prompt(
        &self,
        _prompt: &str,
        scene: &SceneContext,
        snapshot: &CatalogSnapshot,
    ) -> Result<Vec<MatchCandidate>, AppError> {
        let Some(pattern) = scene.pattern() else {
            return Ok(Vec::new());
        };
        let mut candidates: Vec<MatchCandidate> = snapshot
            .workflows
            .iter()
            .filter(|(_, workflow)| workflow.shape_patterns.iter().any(|p| p == pattern))
            .map(|(name, _)| MatchCandidate {
                workflow: name.clone(),
                score: 1.0,
            })
            .collect();
        candidates.sort_by(|a, b| a.workflow.cmp(&b.workflow));
        Ok(candidates)
    }
}
