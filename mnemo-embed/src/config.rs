//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Model used when no name is configured.
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Built-in models that the fastembed provider can load by name.
pub const SUPPORTED_MODELS: &[&str] = &[
    "all-minilm-l6-v2",
    "bge-small-en-v1.5",
    "bge-base-en-v1.5",
    "nomic-embed-text-v1.5",
    "snowflake-arctic-embed-xs",
];

/// Configuration for embedding models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Name of the embedding model to use (see [`SUPPORTED_MODELS`])
    pub model_name: String,
    /// Directory where downloaded model files are cached. `None` uses fastembed's default.
    pub cache_dir: Option<PathBuf>,
    /// Maximum batch size for embedding generation
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    pub normalize: bool,
    /// Show a progress bar while the model downloads
    pub show_download_progress: bool,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            cache_dir: None,
            batch_size: 16,
            normalize: true,
            show_download_progress: false,
        }
    }
}

impl EmbedConfig {
    /// Create a configuration for the named model with default settings.
    pub fn new<S: Into<String>>(model_name: S) -> Self {
        Self {
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Cache model files under `path`.
    pub fn with_cache_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_download_progress(mut self, show: bool) -> Self {
        self.show_download_progress = show;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Model names are matched case-insensitively, ignoring an `org/` prefix.
    pub fn normalized_model_name(&self) -> String {
        let name = self.model_name.trim().to_lowercase();
        name.rsplit('/').next().unwrap_or(&name).to_string()
    }

    /// Validate that the configuration names a supported model and a usable batch size.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be at least 1"));
        }
        let name = self.normalized_model_name();
        if !SUPPORTED_MODELS.contains(&name.as_str()) {
            return Err(EmbedError::invalid_config(format!(
                "Unsupported embedding model '{}'; expected one of: {}",
                self.model_name,
                SUPPORTED_MODELS.join(", ")
            )));
        }
        tracing::debug!("Embedding config validated for: {}", self.model_name);
        Ok(())
    }
}
