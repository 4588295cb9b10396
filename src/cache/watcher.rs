//! Module `watcher`
//!
//! Change-notification plumbing for the file cache: the watch/unwatch seam,
//! its notify-backed implementation, and the task that turns notifications
//! into cache invalidations.

use log::{debug, warn};
use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::cache::file_cache::FileCache;

/// Subscription set for per-file change notifications.
pub trait PathWatcher: Send {
    fn watch(&mut self, path: &Path) -> notify::Result<()>;
    fn unwatch(&mut self, path: &Path) -> notify::Result<()>;
}

/// [`PathWatcher`] backed by the platform's recommended notify watcher.
pub struct NotifyPathWatcher {
    inner: RecommendedWatcher,
}

impl NotifyPathWatcher {
    /// Creates the watcher and the channel its change events are delivered on.
    pub fn new() -> notify::Result<(Self, mpsc::UnboundedReceiver<PathBuf>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let inner = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_content_change(&event.kind) => {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("File watcher error: {e}"),
        })?;

        Ok((Self { inner }, rx))
    }
}

impl PathWatcher for NotifyPathWatcher {
    fn watch(&mut self, path: &Path) -> notify::Result<()> {
        self.inner.watch(path, RecursiveMode::NonRecursive)
    }

    fn unwatch(&mut self, path: &Path) -> notify::Result<()> {
        self.inner.unwatch(path)
    }
}

/// Opening or reading a file is not a change; closing it after a write is.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => true,
        EventKind::Access(_) => false,
        _ => true,
    }
}

/// Long-lived task draining change notifications into the cache.
pub struct Invalidator {
    cache: Arc<FileCache>,
    events: mpsc::UnboundedReceiver<PathBuf>,
}

impl Invalidator {
    pub fn new(cache: Arc<FileCache>, events: mpsc::UnboundedReceiver<PathBuf>) -> Self {
        Self { cache, events }
    }

    /// Tombstones every reported path until all event senders are gone.
    pub async fn run(mut self) {
        while let Some(path) = self.events.recv().await {
            if self.cache.invalidate(&path).await {
                debug!("{} changed on disk, cleared cached copy", path.display());
            }
        }
        debug!("File change notifications closed, invalidator stopped");
    }
}
