//! Watches the vault and turns debounced file changes into background syncs.

use std::path::PathBuf;
use std::time::Duration;

use super::scanner::VaultScanner;
use super::sync_worker::SyncHandle;
use crate::types::SyncRequest;
use anyhow::Result;
use futures::StreamExt;
use notify::Watcher;
use tracing::{debug, error, info};

/// Reason attached to syncs started by file changes.
pub const WATCH_REASON: &str = "watch";

/// Something that can be asked to sync in the background.
pub trait SyncTrigger: Send + Sync {
    fn trigger(&self, reason: &str) -> Result<()>;
}

impl SyncTrigger for SyncHandle {
    fn trigger(&self, reason: &str) -> Result<()> {
        self.request_sync(SyncRequest::new(reason))
    }
}

/// Watches the vault and requests a sync after each burst of relevant changes.
pub struct DirectoryWatcher {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    listener: tokio::task::JoinHandle<()>,
}

impl DirectoryWatcher {
    pub fn start<T: SyncTrigger + 'static>(
        scanner: VaultScanner,
        trigger: T,
        debounce: Duration,
    ) -> Result<Self> {
        let (events_tx, events_rx) = flume::unbounded::<Vec<PathBuf>>();
        let root = scanner.root().to_path_buf();

        // The callback runs on the debouncer's own thread, so a sync send is fine here.
        let mut debouncer = notify_debouncer_mini::new_debouncer(
            debounce,
            move |res: notify_debouncer_mini::DebounceEventResult| match res {
                Ok(events) => {
                    let paths = events.into_iter().map(|ev| ev.path).collect();
                    if events_tx.send(paths).is_err() {
                        debug!("Watch listener gone; dropping file events");
                    }
                }
                Err(e) => error!("File watch error: {}", e),
            },
        )?;
        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)?;

        info!("Watching {} for changes", root.display());
        let listener = tokio::spawn(Self::listen(events_rx, scanner, trigger));
        Ok(Self {
            _debouncer: debouncer,
            listener,
        })
    }

    /// Stops watching and waits for already-delivered events to be handled.
    pub async fn stop(self) -> Result<()> {
        let Self {
            _debouncer,
            listener,
        } = self;
        drop(_debouncer);
        listener.await?;
        Ok(())
    }

    async fn listen<T: SyncTrigger>(
        events_rx: flume::Receiver<Vec<PathBuf>>,
        scanner: VaultScanner,
        trigger: T,
    ) {
        let scanner = &scanner;
        let trigger = &trigger;
        events_rx
            .into_stream()
            .for_each(|paths| async move {
                let relevant: Vec<&PathBuf> = paths.iter().filter(|p| is_relevant(scanner, p)).collect();
                if relevant.is_empty() {
                    return;
                }
                debug!("{} relevant vault changes, requesting sync", relevant.len());
                if let Err(e) = trigger.trigger(WATCH_REASON) {
                    error!("Failed to request sync after file changes: {}", e);
                }
            })
            .await;
    }
}

/// Indexable files, plus extension-less paths outside excluded folders (a removed
/// or renamed folder only reports its own path).
fn is_relevant(scanner: &VaultScanner, path: &std::path::Path) -> bool {
    scanner.is_indexable(path) || (path.extension().is_none() && !scanner.is_excluded(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VaultConfig;
    use std::sync::{Arc, Mutex};
    use tracing_test::traced_test;

    #[derive(Clone, Default)]
    struct RecordingTrigger {
        reasons: Arc<Mutex<Vec<String>>>,
    }

    impl SyncTrigger for RecordingTrigger {
        fn trigger(&self, reason: &str) -> Result<()> {
            self.reasons.lock().unwrap().push(reason.to_string());
            Ok(())
        }
    }

    fn scanner() -> VaultScanner {
        VaultScanner::new(&VaultConfig {
            root: PathBuf::from("/vault"),
            ..VaultConfig::default()
        })
    }

    #[tokio::test]
    #[traced_test]
    async fn test_listen_triggers_on_relevant_batches_only() -> Result<()> {
        let (tx, rx) = flume::unbounded();
        let trigger = RecordingTrigger::default();
        let reasons = Arc::clone(&trigger.reasons);
        let listener = tokio::spawn(DirectoryWatcher::listen(rx, scanner(), trigger));

        tx.send(vec![PathBuf::from("/vault/.obsidian/workspace.json")])?;
        tx.send(vec![PathBuf::from("/vault/image.png")])?;
        tx.send(vec![
            PathBuf::from("/vault/Areas/sky.md"),
            PathBuf::from("/vault/Areas/sea.md"),
        ])?;
        tx.send(vec![PathBuf::from("/vault/Archives")])?;
        drop(tx);
        listener.await?;

        assert_eq!(*reasons.lock().unwrap(), vec![WATCH_REASON, WATCH_REASON]);
        assert!(logs_contain("requesting sync"));
        Ok(())
    }

    #[test]
    fn test_relevance() {
        let scanner = scanner();
        assert!(is_relevant(&scanner, std::path::Path::new("/vault/a.md")));
        assert!(is_relevant(&scanner, std::path::Path::new("/vault/Projects")));
        assert!(!is_relevant(&scanner, std::path::Path::new("/vault/.git/index")));
        assert!(!is_relevant(&scanner, std::path::Path::new("/vault/a.txt")));
    }
}
