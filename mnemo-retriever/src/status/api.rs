use super::types::*;
use crate::config::TiersConfig;
use crate::retrieval::file_index::FileIndex;
use crate::retrieval::indexing_state::{IndexingPhase, IndexingState};
use mnemo_embed::EmbeddingProvider;
use std::path::Path;

/// Builders for the status views exposed by the provider and the CLI.
pub struct StatusApi;

impl StatusApi {
    /// Current indexing operation status. Reads the published state only, so it never
    /// waits on a running sync.
    pub fn get_indexing_status(state: &IndexingState) -> IndexingStatus {
        let is_running = matches!(state.phase, IndexingPhase::Fts | IndexingPhase::Embedding);
        let progress_percentage = (state.phase == IndexingPhase::Embedding && state.total > 0)
            .then(|| state.completed as f32 * 100.0 / state.total as f32);

        IndexingStatus {
            phase: state.phase,
            is_running,
            completed: state.completed,
            total: state.total,
            progress_percentage,
            started_at: state.started_at,
            dirty: state.dirty,
        }
    }

    /// Get index health check information
    pub async fn get_index_health(
        file_index: &FileIndex,
        vector_available: bool,
        embedder_degraded: bool,
    ) -> IndexHealth {
        let (database_connected, database_error) = match file_index.ping().await {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let index_directory_writable = file_index
            .db_path()
            .map(Self::directory_writable)
            .unwrap_or(true);
        let fts_available = file_index.fts_available();

        let overall_status = if !database_connected {
            HealthStatus::Critical
        } else if !index_directory_writable || !fts_available || !vector_available || embedder_degraded
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        IndexHealth {
            database_connected,
            database_error,
            index_directory_writable,
            fts_available,
            vector_available,
            embedder_degraded,
            overall_status,
        }
    }

    fn directory_writable(db_path: &Path) -> bool {
        db_path
            .parent()
            .and_then(|dir| std::fs::metadata(dir).ok())
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false)
    }

    pub fn get_embedding_model_info(
        embedder: &dyn EmbeddingProvider,
        stored_dimension: Option<usize>,
    ) -> EmbeddingModelInfo {
        EmbeddingModelInfo {
            model_id: embedder.model_id(),
            provider_name: embedder.provider_name().to_string(),
            dimension: embedder.embedding_dimension(),
            stored_dimension,
            degraded: embedder.is_degraded(),
        }
    }

    /// Configured tiers merged with whatever health the controller has cached.
    pub fn get_tier_status(config: &TiersConfig, health: &[(String, Option<bool>)]) -> Vec<TierStatus> {
        config
            .tiers
            .iter()
            .map(|tier| TierStatus {
                id: tier.id.clone(),
                enabled: tier.enabled,
                priority: tier.priority,
                timeout_ms: tier.timeout_ms,
                available: health
                    .iter()
                    .find(|(id, _)| *id == tier.id)
                    .and_then(|(_, available)| *available),
            })
            .collect()
    }
}
