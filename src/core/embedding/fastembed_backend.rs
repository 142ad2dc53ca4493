use crate::core::embedding::Embedder;
use crate::core::error::AppError;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use signalbox_types::ErrorCategory;
use std::sync::Mutex;

const MODEL_DIMENSION: usize = 768;

/// Multilingual sentence embedder backed by an ONNX model.
///
/// The model is language-agnostic, which is what makes cross-lingual
/// modifier and hint matching work without per-language keyword tables.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
}

impl FastEmbedder {
    pub fn try_new() -> Result<Self, AppError> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::MultilingualE5Base).with_show_download_progress(false),
        )
        .map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("failed to initialize embedding model: {}", err),
            )
            .with_code("RTR-EMB-002")
        })?;
        Ok(FastEmbedder {
            model: Mutex::new(model),
        })
    }
}

impl Embedder for FastEmbedder {
    fn name(&self) -> &'static str {
        "multilingual-e5-base"
    }

    fn dimension(&self) -> usize {
        MODEL_DIMENSION
    }

    fn fingerprint(&self) -> String {
        format!("multilingual-e5-base/{}", MODEL_DIMENSION)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut model = self.model.lock().map_err(|_| {
            AppError::new(
                ErrorCategory::InternalError,
                "embedding model lock poisoned",
            )
            .with_code("RTR-EMB-003")
        })?;
        model.embed(texts.to_vec(), None).map_err(|err| {
            AppError::new(
                ErrorCategory::InternalError,
                format!("embedding failed: {}", err),
            )
            .with_code("RTR-EMB-004")
        })
    }
}
