//! mnemo-retriever: tiered memory retrieval over a notes vault
//!
//! The local index fuses SQLite FTS5 keyword search with exact vector search, and a
//! tier controller escalates to remote search services only when the local answer is
//! thin. Indexing runs beside queries: while vectors are being written, searches fall
//! back to keyword ranking instead of waiting.
//!
//! ## Key Modules
//!
//! - **[`provider`]**: [`provider::LocalMemory`], the object callers hold
//! - **[`retrieval`]**: indexing engine, scanner, hybrid ranker, sync worker and watcher
//! - **[`tiers`]**: remote tier clients and the escalation controller
//! - **[`storage`]**: storage traits with the SQLite implementation
//! - **[`status`]**: provider status and index health
//! - **[`config`]**: TOML configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mnemo_retriever::config::MemoryConfig;
//! use mnemo_retriever::provider::{LocalMemory, MemorySearchManager};
//! use mnemo_retriever::types::{SearchOptions, SyncRequest};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let memory = LocalMemory::open(MemoryConfig::new("/home/me/notes")).await?;
//! memory.sync(SyncRequest::new("startup")).await?;
//!
//! for hit in memory.search("sky is blue", &SearchOptions::default()).await? {
//!     println!("{:.3} {}:{}", hit.score, hit.path, hit.start_line);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! DirectoryWatcher → SyncWorker → IndexingEngine → Scanner → Chunker → FTS5 + vectors
//!                                                                          ↓
//! query → TieredSearch → HybridRanker (RRF + entity match) ──→ remote tiers if thin
//! ```

pub mod config;
pub mod provider;
pub mod retrieval;
pub mod status;
pub mod storage;
pub mod tiers;
pub mod types;
