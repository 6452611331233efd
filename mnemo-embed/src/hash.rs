//! Deterministic feature-hashing embedder.
//!
//! Used when no model can be loaded. Each lowercased word and each adjacent word
//! pair is hashed with FNV-1a into a signed bucket, and the bucket vector is
//! L2-normalized. Texts that share vocabulary land near each other, which keeps
//! vector search meaningful in a crude way, but it is not semantic: callers should
//! surface [`EmbeddingProvider::is_degraded`] to users.

use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingResult, to_normalized_f16};
use async_trait::async_trait;
use fnv::FnvHasher;
use half::f16;
use std::hash::Hasher;

pub const DEFAULT_HASH_DIMENSION: usize = 256;

#[derive(Debug, Clone)]
pub struct HashEmbedProvider {
    dimension: usize,
}

impl Default for HashEmbedProvider {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_HASH_DIMENSION,
        }
    }
}

impl HashEmbedProvider {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(EmbedError::invalid_config(
                "hash embedding dimension must be at least 1",
            ));
        }
        Ok(Self { dimension })
    }

    /// Embeds synchronously; the async trait methods delegate here.
    pub fn embed_sync(&self, text: &str) -> Vec<f16> {
        let mut buckets = vec![0f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();

        for word in &words {
            self.add_feature(&mut buckets, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let feature = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut buckets, feature.as_bytes(), 0.5);
        }

        to_normalized_f16(&buckets)
    }

    fn add_feature(&self, buckets: &mut [f32], feature: &[u8], weight: f32) {
        let mut hasher = FnvHasher::default();
        hasher.write(feature);
        let h = hasher.finish();
        let index = (h % self.dimension as u64) as usize;
        // High bit picks the sign so collisions tend to cancel rather than pile up.
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        buckets[index] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f16>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        Ok(EmbeddingResult::new(
            texts.iter().map(|t| self.embed_sync(t)).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "hash"
    }

    fn model_id(&self) -> String {
        format!("hash-fnv:{}", self.dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f16], b: &[f16]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x.to_f32() * y.to_f32()).sum()
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let provider = HashEmbedProvider::default();
        let a = provider.embed_sync("The sky is blue");
        let b = provider.embed_sync("the SKY is blue!");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_HASH_DIMENSION);

        let norm: f32 = a.iter().map(|x| x.to_f32() * x.to_f32()).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shared_vocabulary_scores_higher() {
        let provider = HashEmbedProvider::default();
        let query = provider.embed_sync("sky is blue");
        let near = provider.embed_sync("the sky is blue today");
        let far = provider.embed_sync("quarterly tax filing deadline");
        assert!(cosine(&query, &near) > cosine(&query, &far));
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashEmbedProvider::new(8).expect("valid dimension");
        assert!(provider.embed_sync("  ").iter().all(|x| x.to_f32() == 0.0));
        assert!(HashEmbedProvider::new(0).is_err());
    }

    #[tokio::test]
    async fn test_trait_batch_matches_single() -> Result<()> {
        let provider = HashEmbedProvider::new(32)?;
        let texts = vec!["alpha beta".to_string(), "gamma".to_string()];
        let batch = provider.embed_texts(&texts).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.dimension, 32);
        assert_eq!(batch.embeddings[0], provider.embed_text("alpha beta").await?);
        assert_eq!(provider.model_id(), "hash-fnv:32");
        Ok(())
    }
}
