//! Indexing phase and progress, published over a `watch` channel.
//!
//! The indexing engine owns the only [`IndexingTracker`]; everything else holds a
//! `watch::Receiver<IndexingState>` and reads the latest value without locking
//! against an in-flight sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexingPhase {
    #[default]
    Idle,
    /// Scanning, diffing and writing the lexical index.
    Fts,
    /// Writing vectors for changed files. Searches are lexical-only meanwhile.
    Embedding,
    Complete,
}

impl IndexingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fts => "fts",
            Self::Embedding => "embedding",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for IndexingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexingState {
    pub phase: IndexingPhase,
    /// Files embedded so far in the current embedding phase.
    pub completed: usize,
    /// Files to embed in the current embedding phase.
    pub total: usize,
    pub started_at: Option<DateTime<Utc>>,
    /// The vault may have changed since the last complete sync.
    pub dirty: bool,
}

impl IndexingState {
    /// `completed/total`, as shown in status output.
    pub fn progress_label(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }
}

/// Write side of the indexing state.
#[derive(Debug)]
pub struct IndexingTracker {
    tx: watch::Sender<IndexingState>,
}

impl Default for IndexingTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexingTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(IndexingState {
            dirty: true,
            ..IndexingState::default()
        });
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<IndexingState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> IndexingState {
        self.tx.borrow().clone()
    }

    pub fn phase(&self) -> IndexingPhase {
        self.tx.borrow().phase
    }

    /// Enter `fts` for a new sync.
    pub fn begin(&self) {
        self.tx.send_modify(|s| {
            s.phase = IndexingPhase::Fts;
            s.completed = 0;
            s.total = 0;
            s.started_at = Some(Utc::now());
        });
    }

    pub fn enter_embedding(&self, total: usize) {
        self.tx.send_modify(|s| {
            s.phase = IndexingPhase::Embedding;
            s.completed = 0;
            s.total = total;
        });
    }

    pub fn progress(&self, completed: usize) {
        self.tx.send_modify(|s| s.completed = completed);
    }

    pub fn complete(&self, dirty: bool) {
        self.tx.send_modify(|s| {
            s.phase = IndexingPhase::Complete;
            s.dirty = dirty;
        });
    }

    /// A sync stopped on an error; nothing can be assumed about the index contents.
    pub fn abort(&self) {
        self.tx.send_modify(|s| {
            s.phase = IndexingPhase::Idle;
            s.dirty = true;
        });
    }

    pub fn mark_dirty(&self) {
        self.tx.send_if_modified(|s| {
            let changed = !s.dirty;
            s.dirty = true;
            changed
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_are_visible_to_subscribers() {
        let tracker = IndexingTracker::new();
        let rx = tracker.subscribe();
        assert_eq!(rx.borrow().phase, IndexingPhase::Idle);
        assert!(rx.borrow().dirty);

        tracker.begin();
        assert_eq!(rx.borrow().phase, IndexingPhase::Fts);
        assert!(rx.borrow().started_at.is_some());

        tracker.enter_embedding(4);
        tracker.progress(3);
        assert_eq!(rx.borrow().phase, IndexingPhase::Embedding);
        assert_eq!(rx.borrow().progress_label(), "3/4");

        tracker.complete(false);
        assert_eq!(tracker.current().phase, IndexingPhase::Complete);
        assert!(!tracker.current().dirty);

        tracker.mark_dirty();
        assert!(rx.borrow().dirty);

        tracker.abort();
        assert_eq!(tracker.phase(), IndexingPhase::Idle);
    }

    #[test]
    fn test_phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&IndexingPhase::Embedding).unwrap(),
            "\"embedding\""
        );
        assert_eq!(IndexingPhase::Fts.to_string(), "fts");
    }
}
