//! External search tiers and the controller that escalates to them.
//!
//! Tier 0 is always the local index. Further tiers are remote services reached through
//! a [`TierClient`]; they are only called when the local answer is not good enough, and
//! any failure of theirs degrades to the local answer instead of failing the query.

pub mod controller;
pub mod http_client;

use crate::config::TierConfig;
use crate::retrieval::fusion::HybridRanker;
use crate::types::{SearchOptions, SearchResult};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use controller::TieredSearch;
pub use http_client::HttpTierClient;

/// Why a single tier call produced no results.
#[derive(Debug, Error)]
pub enum TierError {
    #[error("tier '{tier}' timed out after {ms} ms")]
    Timeout { tier: String, ms: u64 },

    #[error("tier '{tier}' is unavailable: {reason}")]
    Unavailable { tier: String, reason: String },

    #[error("tier '{tier}' request failed: {message}")]
    Request { tier: String, message: String },

    #[error("tier '{tier}' sent an unreadable response: {message}")]
    Decode { tier: String, message: String },
}

impl TierError {
    pub fn timeout(tier: &TierConfig) -> Self {
        Self::Timeout {
            tier: tier.id.clone(),
            ms: tier.timeout_ms,
        }
    }

    pub fn unavailable<S: Into<String>>(tier: &TierConfig, reason: S) -> Self {
        Self::Unavailable {
            tier: tier.id.clone(),
            reason: reason.into(),
        }
    }

    pub fn request<E: std::fmt::Display>(tier: &TierConfig, error: E) -> Self {
        Self::Request {
            tier: tier.id.clone(),
            message: error.to_string(),
        }
    }

    pub fn decode<E: std::fmt::Display>(tier: &TierConfig, error: E) -> Self {
        Self::Decode {
            tier: tier.id.clone(),
            message: error.to_string(),
        }
    }

    /// Short category name for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Unavailable { .. } => "unavailable",
            Self::Request { .. } => "request",
            Self::Decode { .. } => "decode",
        }
    }
}

/// Client for remote search tiers. One client may serve several tiers; the tier's
/// configuration is passed with every call.
#[async_trait]
pub trait TierClient: Send + Sync {
    /// Search one tier. `budget` is a hard limit; the controller also enforces it.
    async fn search(
        &self,
        tier: &TierConfig,
        query: &str,
        budget: Duration,
    ) -> Result<Vec<SearchResult>, TierError>;

    /// Whether the tier is worth calling at all. Results are cached by the controller.
    async fn health_check(&self, _tier: &TierConfig) -> bool {
        true
    }
}

/// The tier-0 search the controller always runs first.
#[async_trait]
pub trait LocalSearch: Send + Sync {
    async fn search_local(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchResult>>;
}

#[async_trait]
impl LocalSearch for HybridRanker {
    async fn search_local(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> anyhow::Result<Vec<SearchResult>> {
        self.search(query, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_and_messages() {
        let tier = TierConfig::new("shared").with_timeout(Duration::from_millis(250));
        let err = TierError::timeout(&tier);
        assert_eq!(err.kind(), "timeout");
        assert_eq!(err.to_string(), "tier 'shared' timed out after 250 ms");

        let err = TierError::unavailable(&tier, "no endpoint configured");
        assert_eq!(err.kind(), "unavailable");
        assert!(err.to_string().contains("no endpoint configured"));

        assert_eq!(TierError::decode(&tier, "bad json").kind(), "decode");
        assert_eq!(TierError::request(&tier, "refused").kind(), "request");
    }
}
