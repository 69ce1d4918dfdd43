//! Ambient live filesystem watch feeding incremental reindex.
//!
//! Not part of `spec.md`'s required Indexer contract -- an opt-in method the
//! CLI's `serve`/`index --watch` paths can call, reusing the debounced
//! `notify` events to drive `Indexer::index_incremental` without a manual
//! rerun. Debouncing collapses bursts of editor saves/renames into a single
//! batch per `WatcherConfig::debounce_ms` window.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use tokio_util::sync::CancellationToken;

use crate::config::WatcherConfig;
use crate::error::{ConexusError, ConexusResult};

/// Debounced filesystem watcher over a repository root.
pub struct FileWatcher {
    root: PathBuf,
    config: WatcherConfig,
}

impl FileWatcher {
    /// Create a new watcher for `root`, honoring `config`'s debounce window.
    pub fn new(root: &Path, config: &WatcherConfig) -> Self {
        Self { root: root.to_path_buf(), config: config.clone() }
    }

    /// Watch `root` until `cancel` is observed, invoking `on_batch` with the
    /// set of changed paths (relative to `root`, deduplicated) after each
    /// debounce window. Blocks the calling thread; callers typically run
    /// this on a dedicated thread or via `spawn_blocking`.
    pub fn watch(&self, cancel: &CancellationToken, mut on_batch: impl FnMut(Vec<PathBuf>)) -> ConexusResult<()> {
        let (tx, rx) = std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(Duration::from_millis(self.config.debounce_ms.max(1)), move |result| {
            let _ = tx.send(result);
        })
        .map_err(|e| ConexusError::internal(format!("failed to start file watcher: {e}")))?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| ConexusError::internal(format!("failed to watch {}: {e}", self.root.display())))?;

        tracing::info!(root = %self.root.display(), debounce_ms = self.config.debounce_ms, "file watcher started");

        loop {
            if cancel.is_cancelled() {
                tracing::info!("file watcher stopping on cancellation");
                return Ok(());
            }

            match rx.recv_timeout(Duration::from_millis(200)) {
                Ok(Ok(events)) => {
                    let mut paths: Vec<PathBuf> = events
                        .into_iter()
                        .filter_map(|event| event.path.strip_prefix(&self.root).map(Path::to_path_buf).ok())
                        .collect();
                    paths.sort();
                    paths.dedup();
                    if !paths.is_empty() {
                        on_batch(paths);
                    }
                }
                Ok(Err(errors)) => {
                    for error in errors {
                        tracing::warn!(error = %error, "file watcher error");
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(ConexusError::internal("file watcher channel disconnected"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_constructs_over_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WatcherConfig::default();
        let watcher = FileWatcher::new(dir.path(), &config);
        assert_eq!(watcher.root, dir.path());
    }

    #[test]
    fn watch_returns_promptly_when_already_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WatcherConfig { debounce_ms: 10, ..WatcherConfig::default() };
        let watcher = FileWatcher::new(dir.path(), &config);

        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut batches = 0;
        let result = watcher.watch(&cancel, |_| batches += 1);
        assert!(result.is_ok());
        assert_eq!(batches, 0);
    }
}
