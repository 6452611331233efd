//! Result and request types shared by the local engine, the tier controller and callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// `source` tag carried by results from the local index.
pub const LOCAL_SOURCE: &str = "memory";

/// Upper bound on snippet length, in characters.
pub const SNIPPET_MAX_CHARS: usize = 700;

/// One returned hit. Built fresh per query and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Document-relative path (or a tier-specific locator for external hits).
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Score in the producing tier's own scale.
    pub score: f32,
    pub snippet: String,
    /// Tier that produced this hit; [`LOCAL_SOURCE`] for the local index.
    pub source: String,
    /// Set when ranking came from the lexical-only fallback.
    #[serde(default)]
    pub provisional: bool,
}

impl SearchResult {
    pub fn is_local(&self) -> bool {
        self.source == LOCAL_SOURCE
    }
}

/// Truncate `text` to at most `max_chars` characters without splitting a code point.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Per-query overrides. Unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub max_results: Option<usize>,
    pub min_score: Option<f32>,
}

impl SearchOptions {
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Progress through the embedding phase of a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub completed: usize,
    pub total: usize,
    pub label: String,
}

pub type ProgressCallback = Arc<dyn Fn(SyncProgress) + Send + Sync>;

/// A request to bring the index up to date with the vault.
#[derive(Clone, Default)]
pub struct SyncRequest {
    /// Free-form trigger description for logs ("startup", "watch", "cli", ...).
    pub reason: String,
    /// Re-chunk and re-embed even when nothing changed, and run even while a
    /// previous sync is still embedding.
    pub force: bool,
    pub progress: Option<ProgressCallback>,
}

impl SyncRequest {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
            ..Self::default()
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(SyncProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn report(&self, progress: SyncProgress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("reason", &self.reason)
            .field("force", &self.force)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// What a sync did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// True when the call returned without running because another sync was embedding.
    pub skipped: bool,
    pub files_scanned: usize,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub chunks_indexed: usize,
    pub chunks_embedded: usize,
    pub cache_hits: usize,
    pub embedding_failures: usize,
}

impl SyncSummary {
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    pub fn changed_files(&self) -> usize {
        self.files_added + self.files_modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_truncate_snippet_respects_char_boundaries() {
        assert_eq!(truncate_snippet("héllo", 2), "hé");
        assert_eq!(truncate_snippet("short", 700), "short");
        assert_eq!(truncate_snippet("", 3), "");
    }

    #[test]
    fn test_sync_request_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let request = SyncRequest::new("test").forced().with_progress(move |p| {
            if let Ok(mut v) = sink.lock() {
                v.push(p.completed);
            }
        });

        request.report(SyncProgress {
            completed: 1,
            total: 2,
            label: "a.md".to_string(),
        });
        assert!(request.force);
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert!(format!("{request:?}").contains("progress: true"));
    }
}
