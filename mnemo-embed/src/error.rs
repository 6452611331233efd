//! Error types for the embedding system

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Everything that can go wrong while loading a model or producing vectors.
///
/// Callers in the retriever treat any of these as "this file stays lexical-only"
/// rather than as fatal, so the variants mostly exist for log context.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Model configuration is invalid (unknown model, zero batch size, ...)
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// The configured model cache directory cannot be created or written
    #[error("Model cache directory unusable: {path}")]
    CacheDirUnusable { path: PathBuf },

    /// Model download or ONNX session setup failed, as reported by fastembed
    #[error("Model initialization failed: {source}")]
    ModelInitialization {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The model ran but produced no usable vector
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A model produced a vector of the wrong size
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model lock was poisoned by a panicking batch
    #[error("Embedding model lock poisoned")]
    LockPoisoned,

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A blocking embedding task panicked or was cancelled
    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },
}

impl EmbedError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
