//! Local embeddings via fastembed.
//!
//! The model weights are downloaded from Hugging Face on first use and
//! cached; after that, embedding runs entirely offline. Inference is CPU
//! bound, so every call goes through `spawn_blocking`.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::error::EmbedError;

/// Fallback provider running a sentence-transformer on the local CPU.
///
/// The model is loaded lazily on the first embed call and reused for the
/// lifetime of the process. Unlike the remote provider it receives the
/// full untruncated text; fastembed handles its own token windowing.
pub struct LocalEmbedder {
    model_name: String,
    fastembed_model: EmbeddingModel,
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl LocalEmbedder {
    /// Create a provider for the named model. Fails fast on an unknown
    /// model name; the actual weights load on first use.
    pub fn new(model_name: &str) -> Result<Self> {
        let fastembed_model = resolve_model(model_name)?;
        info!(model = %model_name, "local embedding fallback ready");
        Ok(Self {
            model_name: model_name.to_string(),
            fastembed_model,
            model: Arc::new(Mutex::new(None)),
        })
    }

    /// Model name as configured (e.g. `"all-minilm-l6-v2"`).
    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn name(&self) -> &str {
        "local"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let model = Arc::clone(&self.model);
        let fastembed_model = self.fastembed_model.clone();
        let text = text.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<f32>, EmbedError> {
            let mut guard = model.lock().unwrap_or_else(PoisonError::into_inner);

            if guard.is_none() {
                let loaded = TextEmbedding::try_new(
                    InitOptions::new(fastembed_model).with_show_download_progress(true),
                )
                .map_err(|e| {
                    EmbedError::Provider(format!("Failed to initialize local embedding model: {e}"))
                })?;
                *guard = Some(loaded);
            }

            let embedder = guard
                .as_mut()
                .ok_or_else(|| EmbedError::Provider("Local embedding model unavailable".into()))?;

            let embeddings = embedder
                .embed(vec![text], None)
                .map_err(|e| EmbedError::Provider(format!("Local embedding failed: {e}")))?;

            embeddings.into_iter().next().ok_or(EmbedError::Empty)
        })
        .await
        .map_err(|e| EmbedError::Provider(format!("Embedding task join error: {e}")))?
    }
}

fn resolve_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(EmbeddingModel::MultilingualE5Small),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small",
            other
        ),
    }
}
