//! Tiered escalation.
//!
//! Every query runs against the local index first. The local answer is returned as-is
//! when it has at least `min_tier0_results` hits and its best score reaches
//! `escalation_threshold`. Otherwise the enabled tiers are called in priority order,
//! each under its own timeout, and everything is merged, deduplicated by snippet
//! fingerprint and sorted by score.
//!
//! A tier's timeout is one deadline covering both its health check (when the cached
//! answer has expired) and the search itself.

use super::{LocalSearch, TierClient, TierError};
use crate::config::{SearchConfig, TierConfig, TiersConfig};
use crate::types::{SearchOptions, SearchResult};
use anyhow::Result;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

/// Normalized leading text of a snippet: the first `prefix_chars` characters,
/// lowercased, with whitespace runs collapsed to single spaces.
pub fn snippet_fingerprint(snippet: &str, prefix_chars: usize) -> String {
    let prefix: String = snippet.chars().take(prefix_chars).collect();
    prefix.to_lowercase().split_whitespace().join(" ")
}

/// Sorts by score descending and drops later results whose fingerprint was already
/// seen, so each logical hit keeps its best-scored instance. Equal scores keep input
/// order, which favours the local tier.
pub fn dedup_by_fingerprint(mut results: Vec<SearchResult>, prefix_chars: usize) -> Vec<SearchResult> {
    sort_by_score(&mut results);
    let mut seen = HashSet::new();
    results.retain(|r| seen.insert(snippet_fingerprint(&r.snippet, prefix_chars)));
    results
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Cached outcome of a tier health check.
#[derive(Debug, Clone, Copy)]
struct HealthEntry {
    available: bool,
    checked_at: Instant,
}

/// Entry point for queries: local search plus escalation to remote tiers.
pub struct TieredSearch {
    local: Arc<dyn LocalSearch>,
    client: Arc<dyn TierClient>,
    config: TiersConfig,
    search: SearchConfig,
    health: Mutex<HashMap<String, HealthEntry>>,
}

impl TieredSearch {
    pub fn new(
        local: Arc<dyn LocalSearch>,
        client: Arc<dyn TierClient>,
        config: TiersConfig,
        search: SearchConfig,
    ) -> Self {
        Self {
            local,
            client,
            config,
            search,
            health: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TiersConfig {
        &self.config
    }

    /// Whether the local answer is good enough to skip every remote tier.
    pub fn is_sufficient(&self, local: &[SearchResult]) -> bool {
        if local.is_empty() || local.len() < self.config.min_tier0_results {
            return false;
        }
        let best = local.iter().map(|r| r.score).fold(f32::MIN, f32::max);
        best >= self.config.escalation_threshold
    }

    /// Local results only, without escalation.
    pub async fn search_local(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.local.search_local(query, options).await
    }

    /// Search all tiers as needed.
    ///
    /// Errors only when the local search itself fails. Remote failures are logged
    /// and skipped.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let local = self.local.search_local(query, options).await?;
        debug!("Tier 0 returned {} results", local.len());
        if self.is_sufficient(&local) {
            debug!("Local results sufficient, skipping remote tiers");
            return Ok(local);
        }

        let local_count = local.len();
        let mut merged = local;
        let mut consulted = Vec::new();
        for tier in self.config.ordered_enabled() {
            let deadline = Instant::now() + tier.timeout();
            if !self.tier_available(tier, deadline).await {
                debug!(tier = %tier.id, "Skipping tier marked unavailable");
                continue;
            }
            consulted.push(tier.id.as_str());

            match self.call_tier(tier, query, deadline).await {
                Ok(results) => {
                    debug!(tier = %tier.id, "Tier returned {} results", results.len());
                    let sufficient = self.tier_sufficient(&results);
                    merged.extend(results);
                    if sufficient {
                        debug!(tier = %tier.id, "Tier answer sufficient, not escalating further");
                        break;
                    }
                }
                Err(e) => warn!(tier = %tier.id, kind = e.kind(), "Tier search failed: {}", e),
            }
        }

        let max_results = options.max_results.unwrap_or(self.search.max_results);
        let min_score = options.min_score.unwrap_or(self.search.min_score);

        let mut results = dedup_by_fingerprint(merged, self.config.dedup_prefix_chars);
        results.retain(|r| r.score >= min_score);
        results.truncate(max_results);

        info!(
            local = local_count,
            tiers = ?consulted,
            returned = results.len(),
            "Escalated search for {:?}",
            query
        );
        Ok(results)
    }

    async fn call_tier(
        &self,
        tier: &TierConfig,
        query: &str,
        deadline: Instant,
    ) -> Result<Vec<SearchResult>, TierError> {
        let budget = deadline.saturating_duration_since(Instant::now());
        let mut results = timeout_at(deadline, self.client.search(tier, query, budget))
            .await
            .map_err(|_| TierError::timeout(tier))??;
        for result in &mut results {
            result.source = tier.id.clone();
            result.provisional = false;
        }
        Ok(results)
    }

    fn tier_sufficient(&self, results: &[SearchResult]) -> bool {
        self.config.stop_on_sufficient_tier
            && results.len() >= self.config.sufficient_tier_results
            && results
                .iter()
                .any(|r| r.score >= self.config.sufficient_tier_score)
    }

    /// Availability of `tier`, re-checked once the cached answer is older than its TTL.
    async fn tier_available(&self, tier: &TierConfig, deadline: Instant) -> bool {
        if let Some(entry) = self.cached_health(&tier.id) {
            let ttl = if entry.available {
                Duration::from_secs(self.config.health_ttl_available_secs)
            } else {
                Duration::from_secs(self.config.health_ttl_unavailable_secs)
            };
            if entry.checked_at.elapsed() < ttl {
                return entry.available;
            }
        }

        let available = timeout_at(deadline, self.client.health_check(tier))
            .await
            .unwrap_or(false);
        if !available {
            warn!(tier = %tier.id, "Tier health check failed");
        }
        self.health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                tier.id.clone(),
                HealthEntry {
                    available,
                    checked_at: Instant::now(),
                },
            );
        available
    }

    fn cached_health(&self, tier_id: &str) -> Option<HealthEntry> {
        self.health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(tier_id)
            .copied()
    }

    /// Last known availability per configured tier; `None` before the first check.
    pub fn tier_health(&self) -> Vec<(String, Option<bool>)> {
        self.config
            .tiers
            .iter()
            .map(|t| (t.id.clone(), self.cached_health(&t.id).map(|e| e.available)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LOCAL_SOURCE;

    fn result(source: &str, score: f32, snippet: &str) -> SearchResult {
        SearchResult {
            path: format!("{source}/{snippet}"),
            start_line: 1,
            end_line: 1,
            score,
            snippet: snippet.to_string(),
            source: source.to_string(),
            provisional: false,
        }
    }

    #[test]
    fn test_fingerprint_normalizes_prefix() {
        assert_eq!(snippet_fingerprint("  The   Sky\n is BLUE ", 100), "the sky is blue");
        assert_eq!(snippet_fingerprint("abcdef", 3), "abc");
        assert_eq!(
            snippet_fingerprint("Same start, different tail A", 10),
            snippet_fingerprint("same  start, totally different", 10)
        );
    }

    #[test]
    fn test_dedup_keeps_best_scored_instance() {
        let merged = vec![
            result(LOCAL_SOURCE, 0.2, "The sky is blue"),
            result("shared", 0.9, "the  sky is BLUE"),
            result("shared", 0.4, "grass is green"),
        ];
        let results = dedup_by_fingerprint(merged, 100);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "shared");
        assert_eq!(results[0].score, 0.9);
        assert_eq!(results[1].snippet, "grass is green");
    }

    #[test]
    fn test_dedup_prefers_earlier_on_equal_scores() {
        let merged = vec![
            result(LOCAL_SOURCE, 0.5, "duplicate"),
            result("shared", 0.5, "Duplicate"),
        ];
        let results = dedup_by_fingerprint(merged, 100);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, LOCAL_SOURCE);
    }
}
