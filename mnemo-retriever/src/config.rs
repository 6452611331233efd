//! TOML configuration for the memory retriever.
//!
//! Every field has a default, so a config file only needs the keys it changes:
//!
//! ```toml
//! [vault]
//! root = "/home/me/notes"
//!
//! [search]
//! max_results = 10
//!
//! [tiers]
//! escalation_threshold = 0.4
//!
//! [[tiers.tier]]
//! id = "private"
//! endpoint = "http://localhost:8750/search"
//! timeout_ms = 2500
//! ```

use anyhow::{Context, Result};
use mnemo_embed::EmbedConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (under the vault root) that holds the index database by default.
pub const INDEX_DIR: &str = ".mnemo";
/// Database file name inside [`INDEX_DIR`].
pub const INDEX_DB_FILE: &str = "index.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub vault: VaultConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub tiers: TiersConfig,
}

/// Where notes live and which of them are indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub root: PathBuf,
    /// Index database location; defaults to `<root>/.mnemo/index.db`.
    pub db_path: Option<PathBuf>,
    /// Folder names skipped at any depth.
    pub exclude_folders: Vec<String>,
    /// File extensions (without the dot) that are indexed.
    pub extensions: Vec<String>,
    /// Files larger than this are skipped.
    pub max_file_bytes: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            db_path: None,
            exclude_folders: vec![
                INDEX_DIR.to_string(),
                ".obsidian".to_string(),
                ".trash".to_string(),
                ".git".to_string(),
            ],
            extensions: vec!["md".to_string()],
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            tokens: mnemo_context::text::DEFAULT_TARGET_TOKENS,
            overlap: mnemo_context::text::DEFAULT_OVERLAP_TOKENS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub min_score: f32,
    /// Rank damping constant for reciprocal rank fusion.
    pub rrf_k: usize,
    /// Each ranked list fetches `max_results * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    pub snippet_max_chars: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 8,
            min_score: 0.0,
            rrf_k: crate::retrieval::fusion::RRF_K,
            candidate_multiplier: 4,
            snippet_max_chars: crate::types::SNIPPET_MAX_CHARS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX model, falling back to hashing if it cannot load.
    Fastembed,
    /// Feature hashing only. Fast and offline, but not semantic.
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    pub model: String,
    pub cache_dir: Option<PathBuf>,
    pub hash_dims: usize,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Fastembed,
            model: mnemo_embed::DEFAULT_MODEL.to_string(),
            cache_dir: None,
            hash_dims: mnemo_embed::DEFAULT_HASH_DIMENSION,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// When false the vector index reports itself unavailable and search is lexical-only.
    pub enabled: bool,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Escalation policy and the external tiers it may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    /// Best local score below which local results are insufficient.
    pub escalation_threshold: f32,
    /// Local result count below which local results are insufficient.
    pub min_tier0_results: usize,
    /// Length of the normalized snippet prefix used to detect duplicate hits.
    pub dedup_prefix_chars: usize,
    /// Stop calling further tiers once one returns a strong answer.
    pub stop_on_sufficient_tier: bool,
    pub sufficient_tier_results: usize,
    pub sufficient_tier_score: f32,
    /// How long a healthy tier is trusted before its health is re-checked.
    pub health_ttl_available_secs: u64,
    /// How long a failing tier is skipped before its health is re-checked.
    pub health_ttl_unavailable_secs: u64,
    #[serde(rename = "tier")]
    pub tiers: Vec<TierConfig>,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 0.5,
            min_tier0_results: 3,
            dedup_prefix_chars: 100,
            stop_on_sufficient_tier: false,
            sufficient_tier_results: 3,
            sufficient_tier_score: 0.7,
            health_ttl_available_secs: 300,
            health_ttl_unavailable_secs: 60,
            tiers: Vec::new(),
        }
    }
}

impl TiersConfig {
    /// Enabled tiers in call order: ascending priority, declaration order on ties.
    pub fn ordered_enabled(&self) -> Vec<&TierConfig> {
        let mut tiers: Vec<&TierConfig> = self.tiers.iter().filter(|t| t.enabled).collect();
        tiers.sort_by_key(|t| t.priority);
        tiers
    }

    pub fn with_tier(mut self, tier: TierConfig) -> Self {
        self.tiers.push(tier);
        self
    }
}

/// Static configuration for one external tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub id: String,
    pub enabled: bool,
    /// Hard per-call budget.
    pub timeout_ms: u64,
    /// Lower values are called first.
    pub priority: i32,
    /// HTTP endpoint for [`crate::tiers::http_client::HttpTierClient`].
    pub endpoint: Option<String>,
    pub workspace_id: Option<String>,
    pub limit: usize,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            enabled: true,
            timeout_ms: 3000,
            priority: 0,
            endpoint: None,
            workspace_id: None,
            limit: 10,
        }
    }
}

impl TierConfig {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl MemoryConfig {
    /// Configuration for the vault at `root` with every other setting defaulted.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let mut config = Self::default();
        config.vault.root = root.as_ref().to_path_buf();
        config
    }

    /// Read and validate a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.tokens == 0 {
            anyhow::bail!("chunking.tokens must be at least 1");
        }
        if self.chunking.overlap >= self.chunking.tokens {
            anyhow::bail!(
                "chunking.overlap ({}) must be smaller than chunking.tokens ({})",
                self.chunking.overlap,
                self.chunking.tokens
            );
        }
        if self.search.rrf_k == 0 {
            anyhow::bail!("search.rrf_k must be positive");
        }
        let mut seen = std::collections::HashSet::new();
        for tier in &self.tiers.tiers {
            if tier.id.trim().is_empty() {
                anyhow::bail!("every [[tiers.tier]] needs an id");
            }
            if tier.id == crate::types::LOCAL_SOURCE {
                anyhow::bail!("tier id '{}' is reserved for the local index", tier.id);
            }
            if !seen.insert(tier.id.as_str()) {
                anyhow::bail!("duplicate tier id '{}'", tier.id);
            }
        }
        Ok(())
    }

    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.vault
            .db_path
            .clone()
            .unwrap_or_else(|| self.vault.root.join(INDEX_DIR).join(INDEX_DB_FILE))
    }

    /// Embedding settings in the shape `mnemo-embed` expects.
    pub fn embed_config(&self) -> EmbedConfig {
        let mut config = EmbedConfig::new(self.embedding.model.clone())
            .with_batch_size(self.embedding.batch_size.max(1));
        if let Some(dir) = &self.embedding.cache_dir {
            config = config.with_cache_dir(dir);
        }
        config
    }

    pub fn with_db_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.vault.db_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_chunking(mut self, tokens: usize, overlap: usize) -> Self {
        self.chunking = ChunkingConfig { tokens, overlap };
        self
    }

    pub fn with_embedding_backend(mut self, provider: EmbeddingBackend) -> Self {
        self.embedding.provider = provider;
        self
    }

    pub fn with_vector_enabled(mut self, enabled: bool) -> Self {
        self.vector.enabled = enabled;
        self
    }

    pub fn with_tiers(mut self, tiers: TiersConfig) -> Self {
        self.tiers = tiers;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoryConfig::default();
        assert_eq!(config.chunking.tokens, 400);
        assert_eq!(config.chunking.overlap, 80);
        assert_eq!(config.search.max_results, 8);
        assert_eq!(config.search.rrf_k, 60);
        assert_eq!(config.search.snippet_max_chars, 700);
        assert_eq!(config.tiers.min_tier0_results, 3);
        assert_eq!(config.tiers.dedup_prefix_chars, 100);
        assert!(config.vector.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() -> Result<()> {
        let config = MemoryConfig::from_toml_str(
            r#"
            [vault]
            root = "/notes"
            extensions = ["md", "txt"]

            [embedding]
            provider = "hash"

            [[tiers.tier]]
            id = "shared"
            priority = 2

            [[tiers.tier]]
            id = "private"
            priority = 1
            timeout_ms = 500

            [[tiers.tier]]
            id = "off"
            enabled = false
            "#,
        )?;

        assert_eq!(config.vault.root, PathBuf::from("/notes"));
        assert_eq!(config.vault.extensions, vec!["md", "txt"]);
        assert_eq!(config.embedding.provider, EmbeddingBackend::Hash);
        assert_eq!(config.search.max_results, 8);
        assert_eq!(
            config.db_path(),
            PathBuf::from("/notes").join(INDEX_DIR).join(INDEX_DB_FILE)
        );

        let order: Vec<&str> = config
            .tiers
            .ordered_enabled()
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(order, vec!["private", "shared"]);
        assert_eq!(config.tiers.tiers[1].timeout(), Duration::from_millis(500));
        Ok(())
    }

    #[test]
    fn test_validation_errors() {
        assert!(MemoryConfig::from_toml_str("[chunking]\ntokens = 10\noverlap = 10\n").is_err());
        assert!(MemoryConfig::from_toml_str("[[tiers.tier]]\nid = \"memory\"\n").is_err());
        assert!(
            MemoryConfig::from_toml_str("[[tiers.tier]]\nid = \"a\"\n[[tiers.tier]]\nid = \"a\"\n")
                .is_err()
        );
    }

    #[test]
    fn test_toml_roundtrip_keeps_tiers() -> Result<()> {
        let config = MemoryConfig::new("/vault").with_tiers(
            TiersConfig::default()
                .with_tier(TierConfig::new("private").with_endpoint("http://localhost:1/search")),
        );
        let text = config.to_toml_string()?;
        let parsed = MemoryConfig::from_toml_str(&text)?;
        assert_eq!(parsed, config);
        Ok(())
    }
}
