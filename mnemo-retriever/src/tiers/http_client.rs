//! JSON-over-HTTP client for remote tiers: POST to search, GET for health.

use super::{TierClient, TierError};
use crate::config::TierConfig;
use crate::types::{SNIPPET_MAX_CHARS, SearchResult, truncate_snippet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct TierRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    workspace_id: Option<&'a str>,
    limit: usize,
}

#[derive(Debug, Deserialize)]
struct TierResponse {
    #[serde(default)]
    results: Vec<TierHit>,
}

#[derive(Debug, Deserialize)]
struct TierHit {
    id: String,
    content: String,
    score: f32,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    start_line: Option<usize>,
    #[serde(default)]
    end_line: Option<usize>,
}

/// JSON-over-HTTP tier client.
///
/// Sends `POST <endpoint>` with `{"query", "workspace_id", "limit"}` and expects
/// `{"results": [{"id", "content", "score", "path"?}]}` back.
#[derive(Debug, Clone, Default)]
pub struct HttpTierClient {
    client: reqwest::Client,
}

impl HttpTierClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn endpoint<'a>(tier: &'a TierConfig) -> Result<&'a str, TierError> {
        tier.endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| TierError::unavailable(tier, "no endpoint configured"))
    }
}

/// Parses a tier response body into results tagged with the tier id.
pub fn parse_response(tier: &TierConfig, body: &str) -> Result<Vec<SearchResult>, TierError> {
    let response: TierResponse = serde_json::from_str(body).map_err(|e| TierError::decode(tier, e))?;
    Ok(into_results(tier, response))
}

fn into_results(tier: &TierConfig, response: TierResponse) -> Vec<SearchResult> {
    response
        .results
        .into_iter()
        .map(|hit| {
            let start_line = hit.start_line.unwrap_or(1);
            SearchResult {
                path: hit
                    .path
                    .unwrap_or_else(|| format!("tier://{}/{}", tier.id, hit.id)),
                start_line,
                end_line: hit.end_line.unwrap_or(start_line),
                score: hit.score,
                snippet: truncate_snippet(&hit.content, SNIPPET_MAX_CHARS),
                source: tier.id.clone(),
                provisional: false,
            }
        })
        .collect()
}

#[async_trait]
impl TierClient for HttpTierClient {
    async fn search(
        &self,
        tier: &TierConfig,
        query: &str,
        budget: Duration,
    ) -> Result<Vec<SearchResult>, TierError> {
        let endpoint = Self::endpoint(tier)?;
        let body = TierRequest {
            query,
            workspace_id: tier.workspace_id.as_deref(),
            limit: tier.limit,
        };

        let response = self
            .client
            .post(endpoint)
            .timeout(budget)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TierError::timeout(tier)
                } else {
                    TierError::request(tier, e)
                }
            })?
            .error_for_status()
            .map_err(|e| TierError::request(tier, e))?;

        let response: TierResponse = response
            .json()
            .await
            .map_err(|e| TierError::decode(tier, e))?;
        tracing::debug!("Tier {} answered with {} hits", tier.id, response.results.len());
        Ok(into_results(tier, response))
    }

    /// Reachability only: any HTTP response counts, whatever its status.
    async fn health_check(&self, tier: &TierConfig) -> bool {
        let Ok(endpoint) = Self::endpoint(tier) else {
            return false;
        };
        self.client
            .get(endpoint)
            .timeout(tier.timeout())
            .send()
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_maps_hits() -> Result<(), TierError> {
        let tier = TierConfig::new("private");
        let long = "x".repeat(SNIPPET_MAX_CHARS + 50);
        let body = format!(
            r#"{{"results": [
                {{"id": "m1", "content": "The sky is blue", "score": 0.8}},
                {{"id": "m2", "content": "{long}", "score": 0.3, "path": "notes/x.md", "start_line": 4}}
            ]}}"#
        );

        let results = parse_response(&tier, &body)?;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].path, "tier://private/m1");
        assert_eq!(results[0].source, "private");
        assert_eq!((results[0].start_line, results[0].end_line), (1, 1));
        assert_eq!(results[1].path, "notes/x.md");
        assert_eq!((results[1].start_line, results[1].end_line), (4, 4));
        assert_eq!(results[1].snippet.chars().count(), SNIPPET_MAX_CHARS);
        Ok(())
    }

    #[test]
    fn test_parse_response_errors() {
        let tier = TierConfig::new("private");
        assert!(matches!(
            parse_response(&tier, "not json"),
            Err(TierError::Decode { .. })
        ));
        assert!(parse_response(&tier, "{}").map(|r| r.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_unavailable() {
        let client = HttpTierClient::new();
        let tier = TierConfig::new("private");
        let err = client
            .search(&tier, "sky", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert!(!client.health_check(&tier).await);
    }

    #[test]
    fn test_request_body_shape() -> serde_json::Result<()> {
        let body = serde_json::to_value(TierRequest {
            query: "sky",
            workspace_id: None,
            limit: 5,
        })?;
        assert_eq!(body, serde_json::json!({"query": "sky", "limit": 5}));
        Ok(())
    }
}
