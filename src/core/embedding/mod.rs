//! Embedding service: one shared instance wrapping a language-agnostic
//! sentence embedder, with a bounded process-scoped cache and cosine
//! similarity helpers.

#[cfg(feature = "embeddings")]
mod fastembed_backend;

#[cfg(feature = "embeddings")]
pub use fastembed_backend::FastEmbedder;

use crate::core::error::AppError;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use signalbox_types::ErrorCategory;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability implemented by embedding backends.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> usize;
    /// Identifies the model/version for cache keying.
    fn fingerprint(&self) -> String;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

/// Cosine similarity of two vectors, in `[-1, 1]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Deterministic character-trigram embedder.
///
/// This is the degraded/offline path: no model download, pure function of
/// the input text. It gives usable same-language similarity but no
/// cross-lingual transfer.
pub struct HashedEmbedder {
    dimension: usize,
}

impl HashedEmbedder {
    pub fn new(dimension: usize) -> Self {
        HashedEmbedder { dimension }
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        HashedEmbedder::new(256)
    }
}

// FNV-1a; the std hasher is seeded per-process and would break determinism.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Embedder for HashedEmbedder {
    fn name(&self) -> &'static str {
        "hashed-trigram"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        format!("hashed-trigram/{}", self.dimension)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let mut vector = vec![0.0f32; self.dimension];
            let normalized = text.to_lowercase();
            for word in normalized.split(|c: char| !c.is_alphanumeric()) {
                if word.is_empty() {
                    continue;
                }
                let padded: Vec<char> = std::iter::once(' ')
                    .chain(word.chars())
                    .chain(std::iter::once(' '))
                    .collect();
                for window in padded.windows(3) {
                    let gram: String = window.iter().collect();
                    let bucket = (fnv1a(gram.as_bytes()) as usize) % self.dimension;
                    vector[bucket] += 1.0;
                }
            }
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                for v in &mut vector {
                    *v /= norm;
                }
            }
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

/// Test backend returning pinned vectors for known texts and falling back
/// to the hashed embedder for everything else.
pub struct StaticEmbedder {
    pinned: HashMap<String, Vec<f32>>,
    fallback: HashedEmbedder,
    dimension: usize,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        StaticEmbedder {
            pinned: HashMap::new(),
            fallback: HashedEmbedder::new(dimension),
            dimension,
        }
    }

    pub fn pin<T: Into<String>>(mut self, text: T, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), self.dimension, "pinned vector dimension mismatch");
        self.pinned.insert(text.into(), vector);
        self
    }
}

impl Embedder for StaticEmbedder {
    fn name(&self) -> &'static str {
        "static"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        format!("static/{}", self.dimension)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        texts
            .iter()
            .map(|text| match self.pinned.get(text) {
                Some(vector) => Ok(vector.clone()),
                None => Ok(self
                    .fallback
                    .embed_batch(std::slice::from_ref(text))?
                    .remove(0)),
            })
            .collect()
    }
}

/// Process-wide embedding service. All matchers and resolvers share one
/// instance; constructing a second one violates the performance contract.
pub struct EmbeddingService {
    backend: Arc<dyn Embedder>,
    cache: DashMap<String, Arc<Vec<f32>>>,
    cache_max: usize,
}

impl EmbeddingService {
    pub fn new(backend: Arc<dyn Embedder>, cache_max: usize) -> Self {
        EmbeddingService {
            backend,
            cache: DashMap::new(),
            cache_max: cache_max.max(1),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    fn cache_key(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.backend.fingerprint().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Embed one text, deterministically, through the cache.
    pub fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>, AppError> {
        let key = self.cache_key(text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Arc::clone(&hit));
        }
        let vector = self
            .backend
            .embed_batch(std::slice::from_ref(&text.to_string()))?
            .pop()
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::InternalError,
                    "embedding backend returned no vector",
                )
                .with_code("RTR-EMB-001")
            })?;
        let vector = Arc::new(vector);
        if self.cache.len() >= self.cache_max {
            debug!(max = self.cache_max, "embedding cache full; clearing");
            self.cache.clear();
        }
        self.cache.insert(key, Arc::clone(&vector));
        Ok(vector)
    }

    /// Cosine similarity of two texts' embeddings.
    pub fn similarity(&self, a: &str, b: &str) -> Result<f32, AppError> {
        let va = self.embed(a)?;
        let vb = self.embed(b)?;
        Ok(cosine_similarity(&va, &vb))
    }
}
