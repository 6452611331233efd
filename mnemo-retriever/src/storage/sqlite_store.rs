//! SQLite implementation of the storage traits, on top of [`FileIndex`].
//!
//! Vector search is exact: every stored vector is scored against the query with
//! cosine similarity in memory. Vault-sized indexes make this cheap enough, and it
//! keeps the storage engine to what the bundled SQLite provides.

use super::{
    ChunkId, ChunkInfo, ChunkRecord, DocumentRecord, DocumentStore, EmbeddingCacheStore,
    IndexCounts, LexicalIndex, VectorIndex,
};
use crate::retrieval::file_index::FileIndex;
use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Adapter exposing one [`FileIndex`] through every storage trait.
pub struct SqliteStore {
    file_index: FileIndex,
    vector_available: AtomicBool,
}

impl SqliteStore {
    pub fn new(file_index: FileIndex, vector_enabled: bool) -> Self {
        Self {
            file_index,
            vector_available: AtomicBool::new(vector_enabled),
        }
    }

    pub fn file_index(&self) -> &FileIndex {
        &self.file_index
    }

    /// Routes callers around (or back to) the vector index.
    pub fn set_vector_available(&self, available: bool) {
        self.vector_available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl LexicalIndex for SqliteStore {
    fn available(&self) -> bool {
        self.file_index.fts_available()
    }

    async fn upsert(&self, chunk: &ChunkRecord) -> Result<()> {
        self.file_index.upsert_chunk(chunk).await
    }

    async fn delete(&self, path: &str) -> Result<usize> {
        self.file_index.delete_chunks_for_path(path).await
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(ChunkId, f64)>> {
        self.file_index.search_text(query, limit).await
    }
}

#[async_trait]
impl VectorIndex for SqliteStore {
    fn available(&self) -> bool {
        self.vector_available.load(Ordering::SeqCst)
    }

    async fn dimensions(&self) -> Result<Option<usize>> {
        self.file_index.vector_dimensions().await
    }

    async fn upsert(&self, id: &str, vector: &[f16]) -> Result<()> {
        self.file_index.upsert_vector(id, vector).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.file_index.delete_vector(id).await
    }

    async fn search(&self, query: &[f16], limit: usize) -> Result<Vec<(ChunkId, f32)>> {
        let vectors = self.file_index.all_vectors().await?;

        let mut scored: Vec<(ChunkId, f32)> = vectors
            .into_iter()
            .filter(|(_, v)| v.len() == query.len())
            .map(|(id, v)| {
                let distance = 1.0 - cosine_similarity(query, &v);
                (id, distance)
            })
            .collect();

        scored.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl EmbeddingCacheStore for SqliteStore {
    async fn get(&self, hash: &str, model: &str) -> Result<Option<Vec<f16>>> {
        self.file_index.cache_get(hash, model).await
    }

    async fn put(&self, hash: &str, model: &str, vector: &[f16]) -> Result<()> {
        self.file_index.cache_put(hash, model, vector).await
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.file_index.list_documents().await
    }

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<()> {
        self.file_index.upsert_document(document).await
    }

    async fn delete_document(&self, path: &str) -> Result<()> {
        self.file_index.delete_document(path).await
    }

    async fn mark_stale(&self, path: &str) -> Result<()> {
        self.file_index.mark_document_stale(path).await
    }

    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, ChunkRecord>> {
        self.file_index.get_chunks(ids).await
    }

    async fn first_chunk(&self, path: &str) -> Result<Option<ChunkRecord>> {
        self.file_index.first_chunk(path).await
    }

    async fn chunk_hashes(&self, path: &str) -> Result<HashMap<ChunkId, String>> {
        self.file_index.chunk_hashes(path).await
    }

    async fn counts(&self) -> Result<IndexCounts> {
        self.file_index.counts().await
    }

    async fn list_chunks(&self, path_prefix: Option<&str>, limit: usize) -> Result<Vec<ChunkInfo>> {
        self.file_index.list_chunks(path_prefix, limit).await
    }
}

/// Cosine similarity in f32. Mismatched lengths and zero vectors score 0.
pub fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (x.to_f32(), y.to_f32());
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(values: &[f32]) -> Vec<f16> {
        values.iter().copied().map(f16::from_f32).collect()
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_distance() -> Result<()> {
        let store = SqliteStore::new(FileIndex::open_memory().await?, true);
        VectorIndex::upsert(&store, "far", &v(&[0.0, 1.0])).await?;
        VectorIndex::upsert(&store, "near", &v(&[0.8, 0.6])).await?;
        VectorIndex::upsert(&store, "exact", &v(&[1.0, 0.0])).await?;
        VectorIndex::upsert(&store, "wrong-dims", &v(&[1.0, 0.0, 0.0])).await?;

        let hits = VectorIndex::search(&store, &v(&[1.0, 0.0]), 10).await?;
        let ids: Vec<&str> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        assert!(hits[0].1.abs() < 1e-3);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));

        assert_eq!(VectorIndex::search(&store, &v(&[1.0, 0.0]), 1).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_vector_upsert_overwrites_and_delete() -> Result<()> {
        let store = SqliteStore::new(FileIndex::open_memory().await?, true);
        VectorIndex::upsert(&store, "a", &v(&[0.0, 1.0])).await?;
        VectorIndex::upsert(&store, "a", &v(&[1.0, 0.0])).await?;

        let hits = VectorIndex::search(&store, &v(&[1.0, 0.0]), 10).await?;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].1.abs() < 1e-3);

        VectorIndex::delete(&store, "a").await?;
        assert!(VectorIndex::search(&store, &v(&[1.0, 0.0]), 10).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_availability_toggle() -> Result<()> {
        let store = SqliteStore::new(FileIndex::open_memory().await?, false);
        assert!(!VectorIndex::available(&store));
        store.set_vector_available(true);
        assert!(VectorIndex::available(&store));
        assert!(LexicalIndex::available(&store));
        assert!(store.file_index().fts_available());
        Ok(())
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&v(&[1.0, 0.0]), &v(&[1.0, 0.0])) - 1.0).abs() < 1e-3);
        assert_eq!(cosine_similarity(&v(&[1.0, 0.0]), &v(&[0.0, 1.0])), 0.0);
        assert!((cosine_similarity(&v(&[1.0, 0.0]), &v(&[-1.0, 0.0])) + 1.0).abs() < 1e-3);
        assert!((cosine_similarity(&v(&[0.6, 0.8]), &v(&[0.8, 0.6])) - 0.96).abs() < 0.01);
        assert_eq!(cosine_similarity(&v(&[0.0, 0.0]), &v(&[1.0, 1.0])), 0.0);
        assert_eq!(cosine_similarity(&v(&[1.0, 2.0]), &v(&[1.0, 2.0, 3.0])), 0.0);
    }
}
