//! The embedder handed to the retriever: a real model, or the labelled hash fallback.

use crate::config::EmbedConfig;
use crate::error::Result;
use crate::hash::HashEmbedProvider;
use crate::provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider};
use async_trait::async_trait;
use half::f16;

/// An embedding strategy chosen once at startup.
///
/// `HashFallback` is never selected silently by the provider code itself; callers
/// either ask for it or use [`Embedder::model_or_fallback`], which logs the
/// downgrade. [`EmbeddingProvider::is_degraded`] lets status reporting warn about it.
#[derive(Debug, Clone)]
pub enum Embedder {
    Model(FastEmbedProvider),
    HashFallback(HashEmbedProvider),
}

impl Embedder {
    /// Loads the configured model, failing if it cannot be loaded.
    pub async fn model(config: EmbedConfig) -> Result<Self> {
        Ok(Self::Model(FastEmbedProvider::create(config).await?))
    }

    pub fn hash(dimension: usize) -> Result<Self> {
        Ok(Self::HashFallback(HashEmbedProvider::new(dimension)?))
    }

    /// Loads the configured model, or falls back to hashing with a warning.
    pub async fn model_or_fallback(config: EmbedConfig, fallback_dimension: usize) -> Result<Self> {
        match FastEmbedProvider::create(config).await {
            Ok(provider) => Ok(Self::Model(provider)),
            Err(e) => {
                tracing::warn!(
                    "Embedding model unavailable ({}); using hash fallback with {} dims, semantic relevance is degraded",
                    e,
                    fallback_dimension
                );
                Self::hash(fallback_dimension)
            }
        }
    }

    fn inner(&self) -> &dyn EmbeddingProvider {
        match self {
            Self::Model(p) => p as &dyn EmbeddingProvider,
            Self::HashFallback(p) => p as &dyn EmbeddingProvider,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        self.inner().embed_text(text).await
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        self.inner().embed_texts(texts).await
    }

    fn embedding_dimension(&self) -> usize {
        self.inner().embedding_dimension()
    }

    fn provider_name(&self) -> &str {
        self.inner().provider_name()
    }

    fn model_id(&self) -> String {
        self.inner().model_id()
    }

    fn is_degraded(&self) -> bool {
        matches!(self, Self::HashFallback(_))
    }
}
