//! Embedding provider trait and the fastembed-backed implementation

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use half::f16;
use std::sync::{Arc, Mutex};

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Wraps a batch of vectors. The dimension is taken from the first vector, or 0
    /// for an empty batch.
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts, in input order
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Get the dimension of embeddings produced by this provider
    fn embedding_dimension(&self) -> usize;

    /// Get the name/identifier of this provider
    fn provider_name(&self) -> &str;

    /// Identifier of the model whose vectors this provider produces. Cached vectors
    /// are only reused under the same identifier.
    fn model_id(&self) -> String;

    /// True when vectors come from a fallback that does not capture meaning.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// L2-normalize `values` and narrow them to f16.
pub fn to_normalized_f16(values: &[f32]) -> Vec<f16> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter().map(|v| f16::from_f32(v / norm)).collect()
    } else {
        values.iter().copied().map(f16::from_f32).collect()
    }
}

/// Maps a configured model name onto a fastembed built-in.
pub fn resolve_model(config: &EmbedConfig) -> Result<EmbeddingModel> {
    match config.normalized_model_name().as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        "snowflake-arctic-embed-xs" => Ok(EmbeddingModel::SnowflakeArcticEmbedXS),
        _ => Err(EmbedError::invalid_config(format!(
            "Unsupported embedding model '{}'",
            config.model_name
        ))),
    }
}

/// FastEmbed-based embedding provider using local ONNX models.
///
/// Each provider owns its model; there is no process-wide model cache. Share one
/// provider between components by wrapping it in an `Arc`.
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedProvider {
    /// Downloads (if needed) and loads the configured model, then probes it once to
    /// learn its dimension.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        config.validate()?;
        let model_kind = resolve_model(&config)?;

        if let Some(dir) = &config.cache_dir {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|_| EmbedError::CacheDirUnusable { path: dir.clone() })?;
        }

        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            config.model_name()
        );

        let load_config = config.clone();
        let (model, dimension) =
            tokio::task::spawn_blocking(move || -> Result<(TextEmbedding, usize)> {
                let mut options = InitOptions::new(model_kind)
                    .with_show_download_progress(load_config.show_download_progress);
                if let Some(dir) = &load_config.cache_dir {
                    options = options.with_cache_dir(dir.clone());
                }

                let mut model =
                    TextEmbedding::try_new(options).map_err(|e| EmbedError::ModelInitialization {
                        source: e.into(),
                    })?;

                let probe = model
                    .embed(vec!["probe".to_string()], None)
                    .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })?;
                let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);
                if dimension == 0 {
                    return Err(EmbedError::invalid_config(
                        "Model validation failed: empty embedding",
                    ));
                }

                tracing::info!("Model loaded successfully. Dimension: {}", dimension);
                Ok((model, dimension))
            })
            .await??;

        Ok(Self {
            config,
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    fn finish(&self, embedding: Vec<f32>) -> Result<Vec<f16>> {
        if embedding.len() != self.dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model produced non-finite values in embedding",
            ));
        }
        Ok(if self.config.normalize {
            to_normalized_f16(&embedding)
        } else {
            embedding.into_iter().map(f16::from_f32).collect()
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let result = self.embed_texts(&texts).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::invalid_config("No embedding generated for text"))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch = batch.to_vec();
            let model = Arc::clone(&self.model);

            let raw = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model.lock().map_err(|_| EmbedError::LockPoisoned)?;
                guard
                    .embed(batch, None)
                    .map_err(|e| EmbedError::EmbeddingGeneration { source: e.into() })
            })
            .await??;

            for embedding in raw {
                all_embeddings.push(self.finish(embedding)?);
            }
        }

        tracing::debug!("Generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }

    fn model_id(&self) -> String {
        format!("fastembed:{}", self.config.normalized_model_name())
    }
}
