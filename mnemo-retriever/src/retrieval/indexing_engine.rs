//! The indexing engine: keeps the lexical and vector indexes in step with the vault.
//!
//! A sync walks the phases published by [`IndexingTracker`]:
//!
//! ```text
//! idle ─▶ fts ─▶ embedding ─▶ complete
//!          │                     ▲
//!          └─────────────────────┘   (nothing changed, or no vector index)
//! ```
//!
//! ## fts
//! Scan the vault, diff content hashes against the stored documents, drop deleted
//! documents from every index, then re-chunk new and modified files into the
//! lexical index. Keyword search sees the new text as soon as this phase ends.
//!
//! ## embedding
//! One file at a time, embed each chunk (consulting the embedding cache first) and
//! write its vector. A file that fails to embed is logged, marked stale so the next
//! sync retries it, and does not stop its siblings. Progress is reported after
//! every file.
//!
//! Syncs never overlap. A sync requested while another is embedding returns
//! immediately unless it is forced, in which case it waits its turn.

use crate::config::MemoryConfig;
use crate::retrieval::embedding_cache::EmbeddingCache;
use crate::retrieval::indexing_state::{IndexingPhase, IndexingState, IndexingTracker};
use crate::retrieval::scanner::{ScannedFile, VaultScanner};
use crate::storage::{ChunkRecord, DocumentRecord, StoreHandles, chunk_id};
use crate::types::{SyncProgress, SyncRequest, SyncSummary};
use anyhow::{Context, Result};
use half::f16;
use mnemo_context::{DocumentMetadata, TextChunker, content_hash, split_frontmatter};
use mnemo_embed::EmbeddingProvider;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

/// A changed file whose chunks are in the lexical index but not yet embedded.
struct PendingFile {
    path: String,
    metadata: DocumentMetadata,
    chunks: Vec<ChunkRecord>,
}

#[derive(Debug, Default)]
struct FileEmbedding {
    embedded: usize,
    cache_hits: usize,
}

pub struct IndexingEngine {
    scanner: VaultScanner,
    chunker: TextChunker,
    stores: StoreHandles,
    cache: EmbeddingCache,
    embedder: Arc<dyn EmbeddingProvider>,
    tracker: IndexingTracker,
    sync_lock: Mutex<()>,
    force_next: AtomicBool,
}

impl IndexingEngine {
    /// Create an indexing engine for the vault described by `config`.
    ///
    /// # Arguments
    /// * `config` - Vault location and chunking parameters are read from here
    /// * `stores` - Storage the engine writes to; it is the only writer
    /// * `embedder` - Produces vectors for the embedding phase
    pub fn new(config: &MemoryConfig, stores: StoreHandles, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        info!(
            "Initializing IndexingEngine for {} (chunks of {} tokens, {} overlap)",
            config.vault.root.display(),
            config.chunking.tokens,
            config.chunking.overlap
        );
        Self {
            scanner: VaultScanner::new(&config.vault),
            chunker: TextChunker::new(config.chunking.tokens, config.chunking.overlap),
            cache: EmbeddingCache::new(stores.cache.clone()),
            stores,
            embedder,
            tracker: IndexingTracker::new(),
            sync_lock: Mutex::new(()),
            force_next: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<IndexingState> {
        self.tracker.subscribe()
    }

    pub fn state(&self) -> IndexingState {
        self.tracker.current()
    }

    pub fn scanner(&self) -> &VaultScanner {
        &self.scanner
    }

    /// Note that the vault changed without syncing yet.
    pub fn mark_dirty(&self) {
        self.tracker.mark_dirty();
    }

    /// Make the next sync re-chunk and re-embed every file, e.g. after the
    /// embedding model changed.
    pub fn force_next_sync(&self) {
        self.force_next.store(true, Ordering::SeqCst);
        self.tracker.mark_dirty();
    }

    /// Bring the index up to date with the vault.
    ///
    /// # Returns
    /// What the sync did, or [`SyncSummary::skipped`] when another sync was already
    /// embedding and this one was not forced.
    ///
    /// # Errors
    /// Storage failures and an unreadable vault root. Per-file read and embedding
    /// failures are logged and counted instead.
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncSummary> {
        let _guard = match self.sync_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                if self.tracker.phase() == IndexingPhase::Embedding && !request.force {
                    info!(reason = %request.reason, "Sync skipped: another sync is embedding");
                    return Ok(SyncSummary::skipped());
                }
                debug!(reason = %request.reason, "Waiting for the running sync to finish");
                self.sync_lock.lock().await
            }
        };

        let force = request.force || self.force_next.swap(false, Ordering::SeqCst);
        info!(reason = %request.reason, force, "Starting sync");
        self.tracker.begin();

        match self.run(&request, force).await {
            Ok(summary) => {
                self.tracker.complete(summary.embedding_failures > 0);
                info!(
                    reason = %request.reason,
                    scanned = summary.files_scanned,
                    added = summary.files_added,
                    modified = summary.files_modified,
                    deleted = summary.files_deleted,
                    chunks = summary.chunks_indexed,
                    embedded = summary.chunks_embedded,
                    cache_hits = summary.cache_hits,
                    failures = summary.embedding_failures,
                    "Sync complete"
                );
                Ok(summary)
            }
            Err(e) => {
                self.tracker.abort();
                if force {
                    self.force_next.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
        }
    }

    async fn run(&self, request: &SyncRequest, force: bool) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        let scanner = self.scanner.clone();
        let scanned = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .context("Vault scan task failed")??;
        summary.files_scanned = scanned.len();

        let stored: HashMap<String, DocumentRecord> = self
            .stores
            .documents
            .list_documents()
            .await?
            .into_iter()
            .map(|d| (d.path.clone(), d))
            .collect();

        let present: HashSet<&str> = scanned.iter().map(|f| f.rel_path.as_str()).collect();
        let mut deleted: Vec<&String> = stored.keys().filter(|p| !present.contains(p.as_str())).collect();
        deleted.sort();
        for path in deleted {
            self.remove_document(path).await?;
            summary.files_deleted += 1;
        }

        let mut pending = Vec::new();
        for file in &scanned {
            let previous = stored.get(&file.rel_path);
            let is_new = previous.is_none();
            if !force && previous.is_some_and(|d| d.hash == file.hash) {
                continue;
            }
            match self.index_file(file).await? {
                Some(indexed) => {
                    if is_new {
                        summary.files_added += 1;
                    } else {
                        summary.files_modified += 1;
                    }
                    summary.chunks_indexed += indexed.chunks.len();
                    pending.push(indexed);
                }
                None => continue,
            }
        }

        if pending.is_empty() {
            debug!("No new or modified files");
            return Ok(summary);
        }
        if !self.stores.vectors.available() {
            debug!("Vector index unavailable; {} files stay keyword-only", pending.len());
            return Ok(summary);
        }

        let total = pending.len();
        self.tracker.enter_embedding(total);
        for (index, file) in pending.iter().enumerate() {
            match self.embed_file(file).await {
                Ok(done) => {
                    summary.chunks_embedded += done.embedded;
                    summary.cache_hits += done.cache_hits;
                }
                Err(e) => {
                    warn!("Embedding failed for {}; it stays keyword-only until the next sync: {:#}", file.path, e);
                    summary.embedding_failures += 1;
                    if let Err(e) = self.stores.documents.mark_stale(&file.path).await {
                        warn!("Failed to mark {} for reindexing: {}", file.path, e);
                    }
                }
            }

            let completed = index + 1;
            self.tracker.progress(completed);
            request.report(SyncProgress {
                completed,
                total,
                label: file.path.clone(),
            });
        }

        Ok(summary)
    }

    async fn remove_document(&self, path: &str) -> Result<()> {
        debug!("Removing deleted document {}", path);
        if self.stores.vectors.available() {
            for id in self.stores.documents.chunk_hashes(path).await?.keys() {
                self.stores.vectors.delete(id).await?;
            }
        }
        self.stores.lexical.delete(path).await?;
        self.stores.documents.delete_document(path).await
    }

    /// Re-chunks one file into the lexical index. Returns `None` if the file could
    /// not be read, which is logged and leaves its previous index entries in place.
    async fn index_file(&self, file: &ScannedFile) -> Result<Option<PendingFile>> {
        let content = match tokio::fs::read_to_string(&file.abs_path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping {}: {}", file.rel_path, e);
                return Ok(None);
            }
        };

        let metadata = DocumentMetadata::extract(&file.rel_path, &content);
        let note = split_frontmatter(&content);
        let chunks: Vec<ChunkRecord> = self
            .chunker
            .chunks_at(note.body, note.body_offset, note.body_line_offset)
            .map(|c| ChunkRecord {
                id: chunk_id(&file.rel_path, c.start_byte),
                path: file.rel_path.clone(),
                start_line: c.start_line,
                end_line: c.end_line,
                hash: c.hash,
                text: c.text,
            })
            .collect();

        let previous = self.stores.documents.chunk_hashes(&file.rel_path).await?;
        self.stores.lexical.delete(&file.rel_path).await?;
        for chunk in &chunks {
            self.stores.lexical.upsert(chunk).await?;
        }

        if self.stores.vectors.available() {
            let current: HashMap<&str, &str> = chunks
                .iter()
                .map(|c| (c.id.as_str(), c.hash.as_str()))
                .collect();
            for (id, hash) in &previous {
                if current.get(id.as_str()) != Some(&hash.as_str()) {
                    self.stores.vectors.delete(id).await?;
                }
            }
        }

        self.stores
            .documents
            .upsert_document(&DocumentRecord {
                path: file.rel_path.clone(),
                abs_path: file.abs_path.display().to_string(),
                hash: content_hash(&content),
                mtime: file.mtime,
                size: content.len() as u64,
                metadata: metadata.clone(),
            })
            .await?;

        debug!("Indexed {} chunks for {}", chunks.len(), file.rel_path);
        Ok(Some(PendingFile {
            path: file.rel_path.clone(),
            metadata,
            chunks,
        }))
    }

    async fn embed_file(&self, file: &PendingFile) -> Result<FileEmbedding> {
        let model = self.embedder.model_id();
        let inputs: Vec<String> = file
            .chunks
            .iter()
            .map(|c| file.metadata.embedding_input(&c.text))
            .collect();
        let keys: Vec<String> = inputs.iter().map(|i| content_hash(i)).collect();

        let mut vectors: Vec<Option<Vec<f16>>> = Vec::with_capacity(inputs.len());
        for key in &keys {
            vectors.push(self.cache.get(key, &model).await);
        }
        let misses: Vec<usize> = (0..vectors.len()).filter(|&i| vectors[i].is_none()).collect();
        let mut done = FileEmbedding {
            cache_hits: vectors.len() - misses.len(),
            ..FileEmbedding::default()
        };

        if !misses.is_empty() {
            let texts: Vec<String> = misses.iter().map(|&i| inputs[i].clone()).collect();
            let result = self.embedder.embed_texts(&texts).await?;
            if result.len() != texts.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} inputs",
                    result.len(),
                    texts.len()
                );
            }
            for (&i, vector) in misses.iter().zip(result.embeddings) {
                self.cache.put(&keys[i], &model, &vector).await;
                vectors[i] = Some(vector);
            }
        }

        for (chunk, vector) in file.chunks.iter().zip(vectors) {
            if let Some(vector) = vector {
                self.stores.vectors.upsert(&chunk.id, &vector).await?;
                done.embedded += 1;
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::file_index::FileIndex;
    use crate::storage::sqlite_store::SqliteStore;
    use mnemo_embed::Embedder;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    async fn engine_for(root: &std::path::Path) -> Result<(IndexingEngine, Arc<SqliteStore>)> {
        let config = MemoryConfig::new(root).with_chunking(8, 2);
        let store = Arc::new(SqliteStore::new(FileIndex::open_memory().await?, true));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(Embedder::hash(32)?);
        let engine = IndexingEngine::new(&config, StoreHandles::from_sqlite(store.clone()), embedder);
        Ok((engine, store))
    }

    #[tokio::test]
    async fn test_sync_indexes_then_noops() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("sky.md"), "the sky is blue")?;
        std::fs::write(dir.path().join("sea.md"), "---\ntitle: Sea\n---\nthe sea is green")?;
        let (engine, store) = engine_for(dir.path()).await?;

        let first = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(first.files_added, 2);
        assert_eq!(first.chunks_indexed, 2);
        assert_eq!(first.chunks_embedded, 2);
        assert_eq!(engine.state().phase, IndexingPhase::Complete);
        assert!(!engine.state().dirty);

        let counts = store.file_index().counts().await?;
        assert_eq!((counts.files, counts.chunks, counts.vectors), (2, 2, 2));

        let sea = store.file_index().search_text("green", 5).await?;
        let chunks = store.file_index().get_chunks(&[sea[0].0.clone()]).await?;
        assert_eq!(chunks[&sea[0].0].start_line, 4);

        let second = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(second.changed_files(), 0);
        assert_eq!(second.chunks_embedded, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_forced_sync_reuses_cache() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("sky.md"), "the sky is blue")?;
        let (engine, _store) = engine_for(dir.path()).await?;

        engine.sync(SyncRequest::new("test")).await?;
        let forced = engine.sync(SyncRequest::new("test").forced()).await?;
        assert_eq!(forced.files_modified, 1);
        assert_eq!(forced.cache_hits, 1);
        assert_eq!(forced.chunks_embedded, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_modified_file_replaces_stale_vectors() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("sky.md");
        std::fs::write(&path, "one two three four five six seven eight nine ten")?;
        let (engine, store) = engine_for(dir.path()).await?;
        engine.sync(SyncRequest::new("test")).await?;
        let before = store.file_index().counts().await?;
        assert!(before.chunks > 1);

        std::fs::write(&path, "short now")?;
        let summary = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(summary.files_modified, 1);

        let after = store.file_index().counts().await?;
        assert_eq!(after.chunks, 1);
        assert_eq!(after.vectors, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_vectors_disabled_skips_embedding_phase() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("sky.md"), "the sky is blue")?;
        let (engine, store) = engine_for(dir.path()).await?;
        store.set_vector_available(false);

        let summary = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(summary.chunks_indexed, 1);
        assert_eq!(summary.chunks_embedded, 0);
        assert_eq!(store.file_index().counts().await?.vectors, 0);
        assert_eq!(engine.state().phase, IndexingPhase::Complete);
        Ok(())
    }

    #[tokio::test]
    async fn test_force_next_sync_flag() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("sky.md"), "the sky is blue")?;
        let (engine, _store) = engine_for(dir.path()).await?;
        engine.sync(SyncRequest::new("test")).await?;

        engine.force_next_sync();
        assert!(engine.state().dirty);
        let summary = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(summary.files_modified, 1);

        let after = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(after.files_modified, 0);
        Ok(())
    }

    /// Refuses any batch mentioning "poison" until `reject` is cleared.
    struct RejectingEmbedder {
        inner: mnemo_embed::HashEmbedProvider,
        reject: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for RejectingEmbedder {
        async fn embed_text(&self, text: &str) -> mnemo_embed::Result<Vec<f16>> {
            self.inner.embed_text(text).await
        }

        async fn embed_texts(&self, texts: &[String]) -> mnemo_embed::Result<mnemo_embed::EmbeddingResult> {
            if self.reject.load(Ordering::SeqCst) && texts.iter().any(|t| t.contains("poison")) {
                return Err(mnemo_embed::EmbedError::EmbeddingGeneration {
                    source: "model rejected input".into(),
                });
            }
            self.inner.embed_texts(texts).await
        }

        fn embedding_dimension(&self) -> usize {
            self.inner.embedding_dimension()
        }

        fn provider_name(&self) -> &str {
            "rejecting"
        }

        fn model_id(&self) -> String {
            self.inner.model_id()
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_embedding_failure_is_isolated_and_retried() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("sky.md"), "the sky is blue")?;
        std::fs::write(dir.path().join("bad.md"), "poison ivy grows here")?;
        std::fs::write(dir.path().join("sea.md"), "the sea is green")?;

        let config = MemoryConfig::new(dir.path()).with_chunking(8, 2);
        let store = Arc::new(SqliteStore::new(FileIndex::open_memory().await?, true));
        let embedder = Arc::new(RejectingEmbedder {
            inner: mnemo_embed::HashEmbedProvider::new(32)?,
            reject: AtomicBool::new(true),
        });
        let engine = IndexingEngine::new(&config, StoreHandles::from_sqlite(store.clone()), embedder.clone());

        let first = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(first.files_added, 3);
        assert_eq!(first.embedding_failures, 1);
        assert_eq!(first.chunks_embedded, 2);
        assert_eq!(engine.state().phase, IndexingPhase::Complete);
        assert!(engine.state().dirty);
        assert!(logs_contain("Embedding failed for bad.md"));

        // The failed file is still searchable by keyword; its siblings have vectors.
        let counts = store.file_index().counts().await?;
        assert_eq!((counts.files, counts.chunks, counts.vectors), (3, 3, 2));
        assert_eq!(store.file_index().search_text("ivy", 5).await?.len(), 1);

        embedder.reject.store(false, Ordering::SeqCst);
        let retry = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(retry.files_modified, 1);
        assert_eq!(retry.embedding_failures, 0);
        assert!(!engine.state().dirty);
        assert_eq!(store.file_index().counts().await?.vectors, 3);

        let settled = engine.sync(SyncRequest::new("test")).await?;
        assert_eq!(settled.changed_files(), 0);
        Ok(())
    }
}
