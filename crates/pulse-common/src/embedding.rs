/// Embedding providers.
///
/// `EmbeddingProvider` is the seam the classifier depends on. Two backends are provided:
///
/// - `Embedder`: local fastembed model (nomic-embed-text-v1.5). `TextEmbedding` is
///   synchronous and CPU-bound, so every call goes through `tokio::task::spawn_blocking`.
/// - `OpenAiEmbedder`: any OpenAI-compatible `/embeddings` endpoint.
///
/// Backends are not guaranteed to be deterministic; callers must not rely on identical
/// vectors for identical text across calls.
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommonError;
use crate::openai::OpenAiClient;

/// Nomic task prefix for symmetric text-to-label similarity.
const CLASSIFICATION_PREFIX: &str = "classification: ";

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier of the model, used to key cached vectors.
    fn model_id(&self) -> &str;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError>;

    /// Embed several texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError>;
}

/// Wraps fastembed's `TextEmbedding` model.
///
/// The inner model is not `Send`, so all operations are dispatched to a blocking thread.
pub struct Embedder {
    model: Arc<fastembed::TextEmbedding>,
}

impl Embedder {
    /// Initialize the embedding model (nomic-embed-text-v1.5).
    ///
    /// This downloads the model on first run (~300MB). The download happens synchronously
    /// inside a blocking task.
    pub async fn new() -> Result<Self, CommonError> {
        let model = tokio::task::spawn_blocking(|| {
            let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::NomicEmbedTextV15)
                .with_show_download_progress(true);
            fastembed::TextEmbedding::try_new(options)
        })
        .await
        .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
        .map_err(|e| CommonError::Embedding(format!("model initialization failed: {e}")))?;

        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    fn model_id(&self) -> &str {
        "fastembed/nomic-embed-text-v1.5"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        let prefixed = vec![format!("{CLASSIFICATION_PREFIX}{text}")];
        let model = Arc::clone(&self.model);
        let mut results = tokio::task::spawn_blocking(move || model.embed(prefixed, None))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("text embedding failed: {e}")))?;
        results
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    /// Texts are processed in small batches to bound peak memory during ONNX inference.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{CLASSIFICATION_PREFIX}{t}"))
            .collect();
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.embed(prefixed, Some(4)))
            .await
            .map_err(|e| CommonError::Embedding(format!("spawn_blocking join error: {e}")))?
            .map_err(|e| CommonError::Embedding(format!("batch embedding failed: {e}")))
    }
}

/// Embeddings from an OpenAI-compatible HTTP endpoint.
pub struct OpenAiEmbedder {
    client: Arc<OpenAiClient>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(client: Arc<OpenAiClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CommonError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| CommonError::Embedding("empty embedding result".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CommonError> {
        self.client
            .embeddings(&self.model, texts)
            .await
            .map_err(|e| CommonError::Embedding(format!("{} embedding failed: {e}", self.model)))
    }
}
