//! File cache
//!
//! In-memory file contents kept consistent with the filesystem through
//! change notifications.

pub mod file_cache;
pub mod watcher;

pub use file_cache::{CacheEntry, FileCache, cache_key};
pub use watcher::{Invalidator, NotifyPathWatcher, PathWatcher};
