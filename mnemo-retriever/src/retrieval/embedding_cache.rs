//! Content-addressed embedding cache.
//!
//! The cache is an optimization only: a failed read is treated as a miss and a
//! failed write is logged and dropped. Nothing in the retriever depends on an
//! entry being present.

use crate::storage::EmbeddingCacheStore;
use half::f16;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct EmbeddingCache {
    store: Arc<dyn EmbeddingCacheStore>,
}

impl EmbeddingCache {
    pub fn new(store: Arc<dyn EmbeddingCacheStore>) -> Self {
        Self { store }
    }

    /// Cached vector for `(content_hash, model)`, or `None` when it must be computed.
    pub async fn get(&self, content_hash: &str, model: &str) -> Option<Vec<f16>> {
        match self.store.get(content_hash, model).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Embedding cache read failed for {}: {}", content_hash, e);
                None
            }
        }
    }

    pub async fn put(&self, content_hash: &str, model: &str, vector: &[f16]) {
        if let Err(e) = self.store.put(content_hash, model, vector).await {
            warn!("Embedding cache write failed for {}: {}", content_hash, e);
        }
    }
}
