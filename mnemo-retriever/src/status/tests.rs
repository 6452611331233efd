#[cfg(test)]
mod test_suite {
    use super::super::api::StatusApi;
    use super::super::types::{EmbeddingProbeResult, HealthStatus};
    use crate::config::{TierConfig, TiersConfig};
    use crate::retrieval::file_index::FileIndex;
    use crate::retrieval::indexing_state::{IndexingPhase, IndexingState};
    use anyhow::Result;
    use mnemo_embed::Embedder;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_get_index_health() -> Result<()> {
        let temp_dir = tempdir()?;
        let file_index = FileIndex::open(&temp_dir.path().join("index.db")).await?;

        let health = StatusApi::get_index_health(&file_index, true, false).await;
        assert!(health.database_connected);
        assert!(health.database_error.is_none());
        assert!(health.index_directory_writable);
        assert_eq!(health.fts_available, file_index.fts_available());
        if file_index.fts_available() {
            assert_eq!(health.overall_status, HealthStatus::Healthy);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_degraded_parts_downgrade_to_warning() -> Result<()> {
        let file_index = FileIndex::open_memory().await?;

        let health = StatusApi::get_index_health(&file_index, false, false).await;
        assert_eq!(health.overall_status, HealthStatus::Warning);

        let health = StatusApi::get_index_health(&file_index, true, true).await;
        assert_eq!(health.overall_status, HealthStatus::Warning);
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_database_is_critical() -> Result<()> {
        let file_index = FileIndex::open_memory().await?;
        file_index.pool().close().await;

        let health = StatusApi::get_index_health(&file_index, true, false).await;
        assert!(!health.database_connected);
        assert!(health.database_error.is_some());
        assert_eq!(health.overall_status, HealthStatus::Critical);
        Ok(())
    }

    #[test]
    fn test_get_indexing_status() {
        let idle = StatusApi::get_indexing_status(&IndexingState::default());
        assert!(!idle.is_running);
        assert_eq!(idle.phase, IndexingPhase::Idle);
        assert!(idle.progress_percentage.is_none());

        let embedding = StatusApi::get_indexing_status(&IndexingState {
            phase: IndexingPhase::Embedding,
            completed: 1,
            total: 4,
            started_at: None,
            dirty: true,
        });
        assert!(embedding.is_running);
        assert_eq!(embedding.progress_percentage, Some(25.0));
    }

    #[test]
    fn test_get_embedding_model_info() -> Result<()> {
        let embedder = Embedder::hash(64)?;
        let info = StatusApi::get_embedding_model_info(&embedder, Some(64));
        assert_eq!(info.dimension, 64);
        assert_eq!(info.stored_dimension, Some(64));
        assert!(info.degraded);
        Ok(())
    }

    #[test]
    fn test_get_tier_status_merges_health() {
        let config = TiersConfig::default()
            .with_tier(TierConfig::new("private").with_priority(1))
            .with_tier(TierConfig::new("shared").with_priority(2).disabled());
        let health = vec![("private".to_string(), Some(false))];

        let tiers = StatusApi::get_tier_status(&config, &health);
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].available, Some(false));
        assert_eq!(tiers[1].available, None);
        assert!(!tiers[1].enabled);
    }

    #[test]
    fn test_probe_result_serialization() -> Result<()> {
        let ok = serde_json::to_value(EmbeddingProbeResult::ok())?;
        assert_eq!(ok, serde_json::json!({"ok": true}));
        let failed = EmbeddingProbeResult::failed("model missing");
        assert_eq!(failed.error.as_deref(), Some("model missing"));
        Ok(())
    }
}
