//! Ensemble intent matching: independent matchers vote per workflow and
//! the aggregator normalises against the weights that actually
//! contributed.

mod keyword;
mod modifier;
mod pattern;
mod semantic;

pub use keyword::KeywordMatcher;
pub use modifier::{ExtractedModifier, ModifierExtractor};
pub use pattern::PatternMatcher;
pub use semantic::SemanticMatcher;

use crate::core::catalog::CatalogSnapshot;
use crate::core::error::AppError;
use crate::core::scene::SceneContext;
use serde::Serialize;
use serde_json::{Map, Value};
use signalbox_types::ConfidenceLevel;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Multilingual cue words that force LOW confidence: the client asked for
/// a deliberately minimal result, so adaptation must trim to core.
const SIMPLE_TOKENS: &[&str] = &[
    "simple", "basic", "minimal", "just", "only", "plain", "einfach", "schlicht", "sencillo",
    "simples", "basico", "básico", "basique", "semplice", "prosty", "enkel", "eenvoudig",
    "简单", "シンプル", "простой",
];

/// Floating-point noise tolerated at the unit bounds.
const UNIT_EPSILON: f32 = 1e-9;

/// Lowercased word tokens of a prompt.
pub fn tokenize(prompt: &str) -> Vec<String> {
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// One matcher's vote for a workflow.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub workflow: String,
    pub score: f32,
}

/// Capability implemented by every matcher. The aggregator does not
/// assume how many there are.
pub trait Matcher: Send + Sync {
    fn name(&self) -> &'static str;
    fn weight(&self) -> f32;
    fn match_prompt(
        &self,
        prompt: &str,
        scene: &SceneContext,
        snapshot: &CatalogSnapshot,
    ) -> Result<Vec<MatchCandidate>, AppError>;
}

/// One matcher's contribution to the winning workflow.
#[derive(Debug, Clone, Serialize)]
pub struct MatcherContribution {
    pub matcher: &'static str,
    pub score: f32,
    pub weight: f32,
}

/// Aggregated ensemble decision.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub workflow: Option<String>,
    pub raw_score: f32,
    /// `raw_score / max_possible`, where `max_possible` is the weight sum
    /// of the matchers that contributed to the winner.
    pub normalized: f32,
    pub confidence: ConfidenceLevel,
    pub contributions: Vec<MatcherContribution>,
    pub modifiers: Map<String, Value>,
    pub requires_adaptation: bool,
    /// Runner-up workflows by normalized score.
    pub fallbacks: Vec<(String, f32)>,
}

impl EnsembleResult {
    fn none() -> EnsembleResult {
        EnsembleResult {
            workflow: None,
            raw_score: 0.0,
            normalized: 0.0,
            confidence: ConfidenceLevel::None,
            contributions: Vec::new(),
            modifiers: Map::new(),
            requires_adaptation: false,
            fallbacks: Vec::new(),
        }
    }
}

/// Clamp floating-point noise at the unit bounds; anything further out is
/// pinned into `[0, 1]`.
pub fn clamp_unit(score: f32) -> f32 {
    if score > 1.0 && score <= 1.0 + UNIT_EPSILON {
        return 1.0;
    }
    if score < 0.0 && score >= -UNIT_EPSILON {
        return 0.0;
    }
    score.clamp(0.0, 1.0)
}

fn prompt_requests_simple(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    let tokens: Vec<String> = tokenize(prompt);
    SIMPLE_TOKENS.iter().any(|cue| {
        if cue.is_ascii() {
            tokens.iter().any(|t| t == cue)
        } else {
            lowered.contains(cue)
        }
    })
}

#[derive(Default)]
struct WorkflowTally {
    raw: f32,
    max_possible: f32,
    contributions: Vec<MatcherContribution>,
}

/// Fans the prompt out to every matcher and aggregates deterministically.
pub struct EnsembleMatcher {
    matchers: Vec<Arc<dyn Matcher>>,
    extractor: ModifierExtractor,
    confidence_high: f32,
    confidence_medium: f32,
}

impl EnsembleMatcher {
    pub fn new(
        matchers: Vec<Arc<dyn Matcher>>,
        extractor: ModifierExtractor,
        confidence_high: f32,
        confidence_medium: f32,
    ) -> Self {
        EnsembleMatcher {
            matchers,
            extractor,
            confidence_high,
            confidence_medium,
        }
    }

    /// Matcher names and weights, for the health snapshot.
    pub fn roster(&self) -> Vec<(&'static str, f32)> {
        self.matchers.iter().map(|m| (m.name(), m.weight())).collect()
    }

    pub fn match_goal(
        &self,
        prompt: &str,
        scene: &SceneContext,
        snapshot: &CatalogSnapshot,
    ) -> Result<EnsembleResult, AppError> {
        // BTreeMap keeps aggregation order independent of matcher order.
        let mut tallies: BTreeMap<String, WorkflowTally> = BTreeMap::new();

        for matcher in &self.matchers {
            let candidates = matcher.match_prompt(prompt, scene, snapshot)?;
            // A matcher contributes to its best candidate only; a zero
            // score is a non-contribution.
            let Some(best) = candidates.first().filter(|c| c.score > 0.0) else {
                debug!(matcher = matcher.name(), "matcher did not contribute");
                continue;
            };
            let tally = tallies.entry(best.workflow.clone()).or_default();
            tally.raw += matcher.weight() * best.score;
            tally.max_possible += matcher.weight();
            tally.contributions.push(MatcherContribution {
                matcher: matcher.name(),
                score: best.score,
                weight: matcher.weight(),
            });
        }

        if tallies.is_empty() {
            return Ok(EnsembleResult::none());
        }

        let mut ranked: Vec<(String, f32, WorkflowTally)> = tallies
            .into_iter()
            .map(|(workflow, tally)| {
                let normalized = clamp_unit(tally.raw / tally.max_possible);
                (workflow, normalized, tally)
            })
            .collect();
        // Higher normalized score first; alphabetical name breaks ties.
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let (workflow, normalized, tally) = ranked.remove(0);
        let fallbacks = ranked
            .into_iter()
            .map(|(name, score, _)| (name, score))
            .collect();

        let mut confidence = if normalized >= self.confidence_high {
            ConfidenceLevel::High
        } else if normalized >= self.confidence_medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };
        if prompt_requests_simple(prompt) {
            confidence = ConfidenceLevel::Low;
        }

        let modifiers = match snapshot.workflows.get(&workflow) {
            Some(definition) => self
                .extractor
                .extract(prompt, definition)?
                .map(|winner| winner.overrides)
                .unwrap_or_default(),
            None => Map::new(),
        };

        debug!(
            workflow = %workflow,
            normalized,
            confidence = %confidence,
            "ensemble decision"
        );
        Ok(EnsembleResult {
            workflow: Some(workflow),
            raw_score: tally.raw,
            normalized,
            confidence,
            contributions: tally.contributions,
            modifiers,
            requires_adaptation: confidence != ConfidenceLevel::High,
            fallbacks,
        })
    }
}
