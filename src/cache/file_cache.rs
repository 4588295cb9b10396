//! Module `file_cache`
//!
//! Unbounded in-memory cache of file contents keyed by normalized path.
//!
//! A single lock guards the entry map and the watch subscriptions and is held
//! across disk I/O, so operations on any two paths are serialized.

use bytes::Bytes;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use crate::cache::watcher::{Invalidator, NotifyPathWatcher, PathWatcher};
use crate::error::CacheError;

/// State of one cached path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Contents as of the last read or write through the cache.
    Cached(Bytes),
    /// Changed on disk since it was cached; reloaded on next access.
    Tombstone,
}

struct CacheState {
    entries: HashMap<PathBuf, CacheEntry>,
    watcher: Box<dyn PathWatcher>,
}

impl CacheState {
    /// Subscribes to changes of `key`. Returns false if the subscription failed,
    /// in which case the path must not be cached.
    fn watch(&mut self, key: &Path) -> bool {
        match self.watcher.watch(key) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cannot watch {}, serving uncached: {e}", key.display());
                false
            }
        }
    }
}

pub struct FileCache {
    state: Mutex<CacheState>,
}

/// Normalizes `path` into the form used as both cache key and watch key:
/// absolute, without `.` components, rebuilt from its components.
pub fn cache_key(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    Ok(absolute
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect())
}

fn key_for(path: &Path) -> Result<PathBuf, CacheError> {
    cache_key(path).map_err(|source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl FileCache {
    pub fn new(watcher: impl PathWatcher + 'static) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                watcher: Box::new(watcher),
            }),
        }
    }

    /// Cache backed by filesystem notifications, plus the task that applies them.
    pub fn with_notify() -> Result<(Arc<Self>, Invalidator), CacheError> {
        let (watcher, events) = NotifyPathWatcher::new()?;
        let cache = Arc::new(Self::new(watcher));
        let invalidator = Invalidator::new(Arc::clone(&cache), events);
        Ok((cache, invalidator))
    }

    /// Returns the contents of `path`, loading and caching them on a miss or tombstone.
    pub async fn get(&self, path: &Path) -> Result<Bytes, CacheError> {
        let key = key_for(path)?;
        let mut state = self.state.lock().await;

        if let Some(CacheEntry::Cached(data)) = state.entries.get(&key) {
            return Ok(data.clone());
        }

        let data = match fs::read(&key).await {
            Ok(data) => Bytes::from(data),
            Err(source) => {
                debug!("Failed to load {}: {source}", key.display());
                return Err(CacheError::NotFound { path: key, source });
            }
        };

        if state.watch(&key) {
            state.entries.insert(key, CacheEntry::Cached(data.clone()));
        }
        Ok(data)
    }

    /// Writes `data` to disk and, once the write succeeded, to the cache.
    ///
    /// The file is written to a temporary sibling and renamed into place, so a
    /// failure leaves neither a partial file nor a changed cache entry.
    pub async fn put(&self, path: &Path, data: Bytes) -> Result<(), CacheError> {
        let key = key_for(path)?;
        let mut state = self.state.lock().await;

        write_atomically(&key, &data).await?;
        info!("Stored {} ({} bytes)", key.display(), data.len());

        if state.watch(&key) {
            state.entries.insert(key, CacheEntry::Cached(data));
        } else {
            state.entries.remove(&key);
        }
        Ok(())
    }

    /// Drops the cached copy, stops watching and removes the file from disk.
    pub async fn delete(&self, path: &Path) -> Result<(), CacheError> {
        let key = key_for(path)?;
        let mut state = self.state.lock().await;

        state.entries.remove(&key);
        if let Err(e) = state.watcher.unwatch(&key) {
            debug!("{} was not watched: {e}", key.display());
        }

        fs::remove_file(&key)
            .await
            .map_err(|source| CacheError::Io {
                path: key.clone(),
                source,
            })?;
        info!("Deleted {}", key.display());
        Ok(())
    }

    /// Marks `path` stale if it is cached. Returns whether an entry was tombstoned.
    pub async fn invalidate(&self, path: &Path) -> bool {
        let Ok(key) = cache_key(path) else {
            return false;
        };
        let mut state = self.state.lock().await;

        match state.entries.get_mut(&key) {
            Some(entry) => {
                *entry = CacheEntry::Tombstone;
                true
            }
            None => false,
        }
    }

    /// Current entry for `path`, if any.
    pub async fn entry(&self, path: &Path) -> Option<CacheEntry> {
        let key = cache_key(path).ok()?;
        self.state.lock().await.entries.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn write_atomically(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let io_error = |source: io::Error| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    let Some(file_name) = path.file_name() else {
        return Err(io_error(io::Error::from(io::ErrorKind::InvalidInput)));
    };
    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    if let Err(source) = fs::write(&temp, data).await {
        let _ = fs::remove_file(&temp).await;
        return Err(io_error(source));
    }

    if let Err(source) = fs::rename(&temp, path).await {
        let _ = fs::remove_file(&temp).await;
        return Err(io_error(source));
    }

    Ok(())
}
