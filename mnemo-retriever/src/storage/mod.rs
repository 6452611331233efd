//! Storage seams for the local memory index.
//!
//! The retrieval code talks to storage only through the traits in this module, so
//! tests can wrap or replace any one of them (for instance a vector index that
//! counts calls, or one that always errors).
//!
//! ```text
//! LexicalIndex ────────┐
//! VectorIndex ─────────┼── SqliteStore ── FileIndex (SQLite + FTS5)
//! EmbeddingCacheStore ─┤
//! DocumentStore ───────┘
//! ```

use anyhow::Result;
use async_trait::async_trait;
use half::f16;
use mnemo_context::DocumentMetadata;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub mod sqlite_store;

/// Stable chunk identifier: 16 hex characters derived from path and start offset.
pub type ChunkId = String;

/// Derives the id of the chunk that starts at `start_byte` in `path`.
pub fn chunk_id(path: &str, start_byte: usize) -> ChunkId {
    let digest = blake3::hash(format!("{path}:{start_byte}").as_bytes());
    digest.to_hex()[..16].to_string()
}

/// A source document as last seen by the indexing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    /// Vault-relative path with forward slashes.
    pub path: String,
    pub abs_path: String,
    /// blake3 hex of the file content.
    pub hash: String,
    /// Modification time in milliseconds since the epoch.
    pub mtime: i64,
    pub size: u64,
    pub metadata: DocumentMetadata,
}

/// A chunk as written to the lexical index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// blake3 hex of the chunk text.
    pub hash: String,
    pub text: String,
}

/// Chunk metadata without text, for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkInfo {
    pub id: ChunkId,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub hash: String,
    pub has_vector: bool,
}

/// Row counts used by status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub files: usize,
    pub chunks: usize,
    pub vectors: usize,
}

/// Keyword search over chunk text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Whether the inverted index is in use. When false, search still answers through
    /// substring matching, without relevance ranking.
    fn available(&self) -> bool;

    /// Insert or replace a chunk.
    async fn upsert(&self, chunk: &ChunkRecord) -> Result<()>;

    /// Remove every chunk of a document, returning how many were removed.
    async fn delete(&self, path: &str) -> Result<usize>;

    /// Best-first `(chunk id, rank score)` pairs; ties keep insertion order.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<(ChunkId, f64)>>;
}

/// Nearest-neighbour search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Callers must check this before calling [`VectorIndex::search`].
    fn available(&self) -> bool;

    /// Dimension of stored vectors, if any are stored.
    async fn dimensions(&self) -> Result<Option<usize>>;

    /// Insert or overwrite the vector for a chunk.
    async fn upsert(&self, id: &str, vector: &[f16]) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    /// Closest-first `(chunk id, distance)` pairs, where lower distance is more relevant.
    async fn search(&self, query: &[f16], limit: usize) -> Result<Vec<(ChunkId, f32)>>;
}

/// Persistent `(content hash, model) -> vector` store.
#[async_trait]
pub trait EmbeddingCacheStore: Send + Sync {
    async fn get(&self, hash: &str, model: &str) -> Result<Option<Vec<f16>>>;

    /// Writing a key that already exists leaves the stored vector untouched.
    async fn put(&self, hash: &str, model: &str, vector: &[f16]) -> Result<()>;
}

/// Relational storage for documents and chunk rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    async fn upsert_document(&self, document: &DocumentRecord) -> Result<()>;

    async fn delete_document(&self, path: &str) -> Result<()>;

    /// Forget a document's content hash so the next sync re-indexes it.
    async fn mark_stale(&self, path: &str) -> Result<()>;

    /// Chunks for the given ids. Unknown ids are skipped.
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, ChunkRecord>>;

    /// First chunk of a document, by line.
    async fn first_chunk(&self, path: &str) -> Result<Option<ChunkRecord>>;

    /// `chunk id -> chunk hash` for one document.
    async fn chunk_hashes(&self, path: &str) -> Result<HashMap<ChunkId, String>>;

    async fn counts(&self) -> Result<IndexCounts>;

    /// Chunks ordered by path and line, optionally restricted to a path prefix.
    async fn list_chunks(&self, path_prefix: Option<&str>, limit: usize) -> Result<Vec<ChunkInfo>>;
}

/// The storage trait objects the retriever is wired with.
#[derive(Clone)]
pub struct StoreHandles {
    pub documents: Arc<dyn DocumentStore>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub vectors: Arc<dyn VectorIndex>,
    pub cache: Arc<dyn EmbeddingCacheStore>,
}

impl StoreHandles {
    /// Every handle backed by the same SQLite store.
    pub fn from_sqlite(store: Arc<sqlite_store::SqliteStore>) -> Self {
        Self {
            documents: store.clone(),
            lexical: store.clone(),
            vectors: store.clone(),
            cache: store,
        }
    }

    /// Replace the vector index, e.g. with an instrumented wrapper.
    pub fn with_vectors(mut self, vectors: Arc<dyn VectorIndex>) -> Self {
        self.vectors = vectors;
        self
    }
}
