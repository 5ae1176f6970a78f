//! File watching for continuous scanning
//!
//! File-system events are debounced and delivered as one batch, so an editor
//! writing several files at once triggers a single pass.

use crate::session::{ScanMode, ScanSession, SessionRun};
use crate::violation::PageIdentity;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

type EventResult = Result<Vec<DebouncedEvent>, notify::Error>;

/// Debounced template watcher
pub struct Watcher {
    _debouncer: Debouncer<RecommendedWatcher>,
    receiver: Receiver<EventResult>,
    /// Watched directories, canonicalized
    paths: Vec<PathBuf>,
    /// Template suffixes, e.g. `html.erb`
    extensions: Vec<String>,
}

/// Files changed within one debounce window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchBatch {
    pub paths: Vec<PathBuf>,
}

impl Watcher {
    pub fn new(
        paths: &[PathBuf],
        extensions: &[String],
        debounce: Duration,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(debounce, tx)?;

        let mut watched = Vec::new();
        for path in paths {
            let watch_path = if path.is_file() {
                path.parent().unwrap_or(Path::new("."))
            } else {
                path.as_path()
            };
            debouncer
                .watcher()
                .watch(watch_path, RecursiveMode::Recursive)?;
            watched.push(path.canonicalize().unwrap_or_else(|_| path.clone()));
        }

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
            paths: watched,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        })
    }

    /// Block until a batch touches a template; `None` once the watcher stops
    pub fn wait(&self) -> Option<WatchBatch> {
        loop {
            match self.receiver.recv() {
                Ok(events) => {
                    if let Some(batch) = self.batch(events) {
                        return Some(batch);
                    }
                }
                Err(_) => return None,
            }
        }
    }

    /// Like [`Watcher::wait`], giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WatchBatch> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(std::time::Instant::now());
            match self.receiver.recv_timeout(left) {
                Ok(events) => {
                    if let Some(batch) = self.batch(events) {
                        return Some(batch);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    fn batch(&self, events: EventResult) -> Option<WatchBatch> {
        let events = match events {
            Ok(events) => events,
            Err(e) => {
                log::warn!("File watcher error: {}", e);
                return None;
            }
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for event in events {
            let path = event.path;
            if self.matches_watched_path(&path)
                && self.matches_extension(&path)
                && !paths.contains(&path)
            {
                paths.push(path);
            }
        }

        if paths.is_empty() {
            None
        } else {
            Some(WatchBatch { paths })
        }
    }

    fn matches_watched_path(&self, path: &Path) -> bool {
        self.paths
            .iter()
            .any(|watched| path == watched || path.starts_with(watched))
    }

    /// `show.html.erb` matches both `html.erb` and `erb`
    fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.extensions
            .iter()
            .any(|ext| name.ends_with(&format!(".{}", ext)))
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Scan once, then rescan on every batch until the watcher stops
///
/// A pass whose files changed while it ran is not shown; the session is
/// asked again straight away.
pub fn watch_and_run<F>(
    session: &mut ScanSession,
    targets: &[PageIdentity],
    watcher: &Watcher,
    mut callback: F,
) where
    F: FnMut(&SessionRun),
{
    let mut run = session.run(targets, ScanMode::Incremental);
    loop {
        if run.is_stale() {
            log::info!("Results went stale during the scan, rescanning");
            run = session.run(targets, ScanMode::Incremental);
            continue;
        }
        callback(&run);

        let Some(batch) = watcher.wait() else {
            return;
        };
        log::info!("{} template(s) changed", batch.paths.len());
        run = session.run(targets, ScanMode::Incremental);
    }
}
