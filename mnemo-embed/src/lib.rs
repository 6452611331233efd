//! # mnemo-embed
//!
//! Text embeddings for the mnemo retriever. Vectors are produced either by a local
//! ONNX model through FastEmbed or, when no model is available, by a deterministic
//! feature-hashing fallback that is explicitly flagged as degraded.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mnemo_embed::{EmbedConfig, Embedder, EmbeddingProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let embedder = Embedder::model_or_fallback(EmbedConfig::default(), 256).await?;
//! if embedder.is_degraded() {
//!     eprintln!("semantic search is running on the hash fallback");
//! }
//!
//! let texts = vec!["The sky is blue".to_string()];
//! let result = embedder.embed_texts(&texts).await?;
//! println!("{} vectors of dimension {}", result.len(), result.dimension);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: model selection and batching
//! - [`provider`]: the [`EmbeddingProvider`] trait and [`FastEmbedProvider`]
//! - [`hash`]: the [`HashEmbedProvider`] fallback
//! - [`embedder`]: the [`Embedder`] enum the retriever holds
//! - [`error`]: [`EmbedError`] and the crate [`Result`]
//!
//! Vectors are stored as half-precision (`f16`) to halve index size.

pub mod config;
pub mod embedder;
pub mod error;
pub mod hash;
pub mod provider;

pub use config::{DEFAULT_MODEL, EmbedConfig, SUPPORTED_MODELS};
pub use embedder::Embedder;
pub use error::{EmbedError, Result};
pub use hash::{DEFAULT_HASH_DIMENSION, HashEmbedProvider};
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, to_normalized_f16};
