//! Module `reload`
//!
//! Watches the folder definitions file and republishes the registry when it
//! changes. Invalid files are reported and the previous registry stays live.

use log::{error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::folders::registry::SharedRegistry;

/// Running reload task together with the watcher feeding it.
pub struct FoldersReloader {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl FoldersReloader {
    /// Stops watching and ends the reload task.
    pub fn stop(self) {
        self.task.abort();
    }
}

/// Starts reloading `path` into `registry` whenever the file changes.
///
/// The parent directory is watched rather than the file itself because
/// editors commonly replace the file through a rename.
pub fn watch_folders_file(
    path: PathBuf,
    registry: SharedRegistry,
) -> Result<FoldersReloader, notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let watched_name = path.file_name().map(|name| name.to_os_string());

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if !matches!(event.kind, EventKind::Access(_)) => {
            let touches_file = event
                .paths
                .iter()
                .any(|changed| changed.file_name() == watched_name.as_deref());
            if touches_file {
                let _ = tx.send(());
            }
        }
        Ok(_) => {}
        Err(e) => warn!("Folder definitions watcher error: {e}"),
    })?;

    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!("Watching folder definitions {}", path.display());

    let task = tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // A single save usually produces a burst of events.
            while rx.try_recv().is_ok() {}

            info!("Folder definitions changed: {}", path.display());
            if let Err(e) = registry.reload_from(&path) {
                error!("Keeping previous folder registry: {e}");
            }
        }
    });

    Ok(FoldersReloader {
        _watcher: watcher,
        task,
    })
}
