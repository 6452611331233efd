//! The memory provider: one object that owns the index, the indexing engine, the
//! local ranker and the tier controller, and exposes them to the rest of the platform.

use crate::config::{EmbeddingBackend, MemoryConfig};
use crate::retrieval::file_index::FileIndex;
use crate::retrieval::fusion::HybridRanker;
use crate::retrieval::indexing_engine::IndexingEngine;
use crate::status::{EmbeddingModelInfo, EmbeddingProbeResult, IndexHealth, ProviderStatus, StatusApi};
use crate::storage::sqlite_store::SqliteStore;
use crate::storage::{ChunkInfo, StoreHandles};
use crate::tiers::{HttpTierClient, TierClient, TieredSearch};
use crate::types::{SearchOptions, SearchResult, SyncRequest, SyncSummary};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use mnemo_embed::{Embedder, EmbeddingProvider};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// `db_path` value that keeps the index in memory.
pub const IN_MEMORY_DB: &str = ":memory:";

const BACKEND_NAME: &str = "builtin";

/// What callers of the memory subsystem rely on.
#[async_trait]
pub trait MemorySearchManager: Send + Sync {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>>;

    async fn sync(&self, request: SyncRequest) -> Result<SyncSummary>;

    async fn status(&self) -> Result<ProviderStatus>;

    /// Re-checks the vector index and reports whether semantic search is in use.
    async fn probe_vector_availability(&self) -> bool;

    /// Present when the provider computes embeddings itself.
    fn embedding_probe(&self) -> Option<&dyn EmbeddingProbe>;

    async fn probe_embedding_availability(&self) -> Option<EmbeddingProbeResult> {
        match self.embedding_probe() {
            Some(probe) => Some(probe.probe_embedding_availability().await),
            None => None,
        }
    }
}

/// Optional capability: check that embeddings can be produced right now.
#[async_trait]
pub trait EmbeddingProbe: Send + Sync {
    async fn probe_embedding_availability(&self) -> EmbeddingProbeResult;
}

/// Probes by embedding a short text with the provider's embedder.
struct EmbedderProbe {
    embedder: Arc<dyn EmbeddingProvider>,
}

#[async_trait]
impl EmbeddingProbe for EmbedderProbe {
    async fn probe_embedding_availability(&self) -> EmbeddingProbeResult {
        match self.embedder.embed_text("embedding probe").await {
            Ok(vector) if vector.len() != self.embedder.embedding_dimension() => {
                EmbeddingProbeResult::failed(format!(
                    "embedder returned {} dimensions, expected {}",
                    vector.len(),
                    self.embedder.embedding_dimension()
                ))
            }
            Ok(_) if self.embedder.is_degraded() => EmbeddingProbeResult::failed(
                "embeddings come from the hash fallback; semantic relevance is degraded",
            ),
            Ok(_) => EmbeddingProbeResult::ok(),
            Err(e) => EmbeddingProbeResult::failed(e.to_string()),
        }
    }
}

/// A window of lines read from a vault file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSlice {
    /// Vault-relative path as requested
    pub path: String,
    pub abs_path: PathBuf,
    /// 1-based first line of `text`
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
}

/// The local memory provider.
pub struct LocalMemory {
    config: MemoryConfig,
    store: Arc<SqliteStore>,
    stores: StoreHandles,
    embedder: Arc<dyn EmbeddingProvider>,
    engine: Arc<IndexingEngine>,
    tiered: TieredSearch,
    embedding_probe: Option<Box<dyn EmbeddingProbe>>,
}

impl LocalMemory {
    /// Opens the index for `config`, loading the configured embedder.
    pub async fn open(config: MemoryConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(build_embedder(&config).await?);
        Self::open_with(config, embedder, Arc::new(HttpTierClient::new())).await
    }

    /// Opens the index with a caller-supplied embedder and tier client.
    pub async fn open_with(
        config: MemoryConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        tier_client: Arc<dyn TierClient>,
    ) -> Result<Self> {
        config.validate()?;
        let db_path = config.db_path();
        let file_index = if db_path.as_os_str() == IN_MEMORY_DB {
            FileIndex::open_memory().await?
        } else {
            FileIndex::open(&db_path).await?
        };
        let store = Arc::new(SqliteStore::new(file_index, config.vector.enabled));
        let stores = StoreHandles::from_sqlite(store.clone());
        Self::assemble(config, store, stores, embedder, tier_client).await
    }

    /// Wires the provider from already-open parts. `stores` normally wraps `store`,
    /// but any handle may be replaced.
    pub async fn assemble(
        config: MemoryConfig,
        store: Arc<SqliteStore>,
        stores: StoreHandles,
        embedder: Arc<dyn EmbeddingProvider>,
        tier_client: Arc<dyn TierClient>,
    ) -> Result<Self> {
        let model_changed = store
            .file_index()
            .ensure_embedding_model(&embedder.model_id())
            .await?;

        let engine = Arc::new(IndexingEngine::new(&config, stores.clone(), embedder.clone()));
        if model_changed {
            info!("Embedding model is now {}; the next sync re-embeds every file", embedder.model_id());
            engine.force_next_sync();
        }

        let ranker = HybridRanker::new(
            stores.documents.clone(),
            stores.lexical.clone(),
            stores.vectors.clone(),
            embedder.clone(),
            engine.subscribe(),
            config.search.clone(),
        );
        let tiered = TieredSearch::new(
            Arc::new(ranker),
            tier_client,
            config.tiers.clone(),
            config.search.clone(),
        );

        let embedding_probe: Option<Box<dyn EmbeddingProbe>> = config.vector.enabled.then(|| {
            Box::new(EmbedderProbe {
                embedder: embedder.clone(),
            }) as Box<dyn EmbeddingProbe>
        });

        Ok(Self {
            config,
            store,
            stores,
            embedder,
            engine,
            tiered,
            embedding_probe,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Shared handle to the indexing engine, for a [`crate::retrieval::sync_worker::SyncWorker`].
    pub fn engine(&self) -> Arc<IndexingEngine> {
        self.engine.clone()
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn tiered(&self) -> &TieredSearch {
        &self.tiered
    }

    /// Tier-0 results only.
    pub async fn search_local(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.tiered.search_local(query, options).await
    }

    pub async fn health(&self) -> IndexHealth {
        StatusApi::get_index_health(
            self.store.file_index(),
            self.stores.vectors.available(),
            self.embedder.is_degraded(),
        )
        .await
    }

    pub async fn model_info(&self) -> EmbeddingModelInfo {
        let stored = self.stored_vector_dims().await;
        StatusApi::get_embedding_model_info(self.embedder.as_ref(), stored)
    }

    async fn stored_vector_dims(&self) -> Option<usize> {
        match self.stores.vectors.dimensions().await {
            Ok(dims) => dims,
            Err(e) => {
                warn!("Could not read vector dimensions: {}", e);
                None
            }
        }
    }

    pub async fn list_chunks(&self, path_prefix: Option<&str>, limit: usize) -> Result<Vec<ChunkInfo>> {
        self.stores.documents.list_chunks(path_prefix, limit).await
    }

    /// Reads `lines` lines of a vault file starting at 1-based line `from`.
    ///
    /// Paths that are absolute or lead outside the vault are rejected.
    pub async fn read_file(&self, rel_path: &str, from: Option<usize>, lines: Option<usize>) -> Result<FileSlice> {
        let root = &self.config.vault.root;
        let requested = Path::new(rel_path);
        if requested.is_absolute()
            || requested
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("Path {} is not inside the vault", rel_path);
        }

        let canonical_root = tokio::fs::canonicalize(root)
            .await
            .with_context(|| format!("Vault root {} is not accessible", root.display()))?;
        let abs_path = tokio::fs::canonicalize(root.join(requested))
            .await
            .with_context(|| format!("File not found: {rel_path}"))?;
        if !abs_path.starts_with(&canonical_root) {
            bail!("Path {} is not inside the vault", rel_path);
        }

        let content = tokio::fs::read_to_string(&abs_path)
            .await
            .with_context(|| format!("Failed to read {rel_path}"))?;
        let all: Vec<&str> = content.lines().collect();
        let start = from.unwrap_or(1).max(1);
        let count = lines.unwrap_or(all.len());
        let selected: Vec<&str> = all.iter().skip(start - 1).take(count).copied().collect();

        Ok(FileSlice {
            path: rel_path.to_string(),
            abs_path,
            start_line: start,
            end_line: start + selected.len().saturating_sub(1),
            text: selected.join("\n"),
        })
    }

    /// Closes the database pool. Pending queries finish first.
    pub async fn close(&self) {
        self.store.file_index().pool().close().await;
    }
}

#[async_trait]
impl MemorySearchManager for LocalMemory {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        self.tiered.search(query, options).await
    }

    async fn sync(&self, request: SyncRequest) -> Result<SyncSummary> {
        self.engine.sync(request).await
    }

    async fn status(&self) -> Result<ProviderStatus> {
        let counts = self.stores.documents.counts().await?;
        let state = self.engine.state();

        Ok(ProviderStatus {
            backend: BACKEND_NAME.to_string(),
            provider: self.embedder.provider_name().to_string(),
            model: self.embedder.model_id(),
            files: counts.files,
            chunks: counts.chunks,
            vectors: counts.vectors,
            dirty: state.dirty,
            indexing_phase: state.phase,
            indexing_progress: state.progress_label(),
            fts_available: self.stores.lexical.available(),
            vector_available: self.stores.vectors.available(),
            vector_dims: self.stored_vector_dims().await,
            embedder_degraded: self.embedder.is_degraded(),
            workspace_dir: self.config.vault.root.display().to_string(),
            db_path: self
                .store
                .file_index()
                .db_path()
                .map(|p| p.display().to_string()),
            tiers: StatusApi::get_tier_status(&self.config.tiers, &self.tiered.tier_health()),
        })
    }

    async fn probe_vector_availability(&self) -> bool {
        if !self.config.vector.enabled {
            return false;
        }
        let reachable = match self.store.file_index().vector_dimensions().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Vector index probe failed; searches stay keyword-only: {}", e);
                false
            }
        };
        self.store.set_vector_available(reachable);
        self.stores.vectors.available()
    }

    fn embedding_probe(&self) -> Option<&dyn EmbeddingProbe> {
        self.embedding_probe.as_deref()
    }
}

async fn build_embedder(config: &MemoryConfig) -> Result<Embedder> {
    let embedder = match config.embedding.provider {
        EmbeddingBackend::Hash => Embedder::hash(config.embedding.hash_dims)?,
        EmbeddingBackend::Fastembed => {
            Embedder::model_or_fallback(config.embed_config(), config.embedding.hash_dims).await?
        }
    };
    Ok(embedder)
}
