use crate::core::catalog::CatalogSnapshot;
use crate::core::embedding::{cosine_similarity, EmbeddingService};
use crate::core::error::AppError;
use crate::core::matching::{MatchCandidate, Matcher};
use crate::core::scene::SceneContext;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct DescriptionIndex {
    epoch: u64,
    vectors: HashMap<String, Arc<Vec<f32>>>,
}

/// Embedding-similarity matcher over workflow descriptions. Returns raw
/// scores without applying an internal confidence threshold; the
/// aggregator decides what is good enough.
///
/// Description vectors are rebuilt lazily whenever the catalog epoch
/// moves — that is the loader's refresh event.
pub struct SemanticMatcher {
    service: Arc<EmbeddingService>,
    weight: f32,
    index: Mutex<Option<DescriptionIndex>>,
}

impl SemanticMatcher {
    pub fn new(service: Arc<EmbeddingService>, weight: f32) -> Self {
        SemanticMatcher {
            service,
            weight,
            index: Mutex::new(None),
        }
    }

    fn ensure_index(&self, snapshot: &CatalogSnapshot) -> Result<(), AppError> {
        {
            let guard = self.index.lock().expect("semantic index poisoned");
            if guard
                .as_ref()
                .map(|index| index.epoch == snapshot.epoch)
                .unwrap_or(false)
            {
                return Ok(());
            }
        }

        debug!(epoch = snapshot.epoch, "re-embedding workflow descriptions");
        let mut vectors = HashMap::new();
        for (name, workflow) in &snapshot.workflows {
            let text = if workflow.description.trim().is_empty() {
                name.replace('_', " ")
            } else {
                workflow.description.clone()
            };
            vectors.insert(name.clone(), self.service.embed(&text)?);
        }

        let mut guard = self.index.lock().expect("semantic index poisoned");
        *guard = Some(DescriptionIndex {
            epoch: snapshot.epoch,
            vectors,
        });
        Ok(())
    }
}

impl Matcher for SemanticMatcher {
    fn name(&self) -> &'static str {
        "semantic"
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
        self.ensure_index(snapshot)?;
        let prompt_vector = self.service.embed(prompt)?;

        let guard = self.index.lock().expect("semantic index poisoned");
        let Some(index) = guard.as_ref() else {
            return Ok(Vec::new());
        };

        let mut candidates: Vec<MatchCandidate> = index
            .vectors
            .iter()
            .map(|(name, vector)| MatchCandidate {
                workflow: name.clone(),
                score: cosine_similarity(&prompt_vector, vector).max(0.0),
            })
            .filter(|candidate| candidate.score > 0.0)
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.workflow.cmp(&b.workflow))
        });
        Ok(candidates)
    }
}
