use crate::retrieval::indexing_state::IndexingPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the memory provider for operational tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Storage backend kind
    pub backend: String,
    /// Provider name
    pub provider: String,
    /// Embedding model identifier
    pub model: String,
    /// Documents in the index
    pub files: usize,
    /// Chunks in the lexical index
    pub chunks: usize,
    /// Chunks that have a vector
    pub vectors: usize,
    /// True when the vault may have changed since the last complete sync
    pub dirty: bool,
    pub indexing_phase: IndexingPhase,
    /// `completed/total` for the embedding phase
    pub indexing_progress: String,
    pub fts_available: bool,
    pub vector_available: bool,
    /// Dimension of stored vectors, if any are stored
    pub vector_dims: Option<usize>,
    /// True when vectors come from the hashing fallback
    pub embedder_degraded: bool,
    pub workspace_dir: String,
    /// `None` for an in-memory index
    pub db_path: Option<String>,
    pub tiers: Vec<TierStatus>,
}

/// Configured remote tier and its last known health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierStatus {
    pub id: String,
    pub enabled: bool,
    pub priority: i32,
    pub timeout_ms: u64,
    /// `None` until the tier has been health-checked
    pub available: Option<bool>,
}

/// Current indexing operation status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingStatus {
    pub phase: IndexingPhase,
    /// Is a sync currently running?
    pub is_running: bool,
    /// Files embedded so far in the current embedding phase
    pub completed: usize,
    /// Files to embed in the current embedding phase
    pub total: usize,
    /// Progress percentage (0-100), only while embedding
    pub progress_percentage: Option<f32>,
    pub started_at: Option<DateTime<Utc>>,
    pub dirty: bool,
}

/// Index health check information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHealth {
    /// Database connectivity status
    pub database_connected: bool,
    /// Database connectivity error message (if any)
    pub database_error: Option<String>,
    /// File permissions for index directory
    pub index_directory_writable: bool,
    pub fts_available: bool,
    pub vector_available: bool,
    pub embedder_degraded: bool,
    /// Overall health status
    pub overall_status: HealthStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Information about the embedding model in use
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingModelInfo {
    pub model_id: String,
    pub provider_name: String,
    /// Dimension the model produces
    pub dimension: usize,
    /// Dimension of vectors already stored, if different models were ever used this
    /// shows what the index holds
    pub stored_dimension: Option<usize>,
    pub degraded: bool,
}

/// Outcome of probing whether embeddings can be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbeddingProbeResult {
    pub fn ok() -> Self {
        Self { ok: true, error: None }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}
