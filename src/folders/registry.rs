//! Module `registry`
//!
//! Immutable snapshot of all folder definitions plus the shared handle that
//! swaps snapshots atomically when the definitions file is reloaded.

use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{FolderConfigError, ResolveError};
use crate::folders::config::FolderConfig;

/// URL prefix under which all folders are served.
pub const STORAGE_PREFIX: &str = "/storage/";

/// On-disk shape of the folder definitions file.
#[derive(Deserialize)]
struct FolderDefinitions {
    #[serde(default)]
    folders: HashMap<String, FolderConfig>,

    #[serde(rename = "authKey", alias = "auth_key", default)]
    auth_key: String,
}

/// A complete, validated set of folder definitions.
///
/// Never mutated after construction; reloads build a new registry and swap it in.
pub struct FolderRegistry {
    folders: HashMap<String, Arc<FolderConfig>>,
    auth_key: String,
}

impl fmt::Debug for FolderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FolderRegistry")
            .field("folders", &self.folders)
            .field("auth_key", &"<redacted>")
            .finish()
    }
}

impl FolderRegistry {
    /// Builds a registry, rejecting folder keys that could never be resolved.
    pub fn new(
        folders: HashMap<String, FolderConfig>,
        auth_key: impl Into<String>,
    ) -> Result<Self, FolderConfigError> {
        for (key, folder) in &folders {
            if !is_folder_key(key) {
                return Err(FolderConfigError::InvalidKey(key.clone()));
            }
            if folder.directory.as_os_str().is_empty() {
                return Err(FolderConfigError::EmptyDirectory(key.clone()));
            }
        }

        let auth_key = auth_key.into();
        if !folders.is_empty() && auth_key.is_empty() {
            return Err(FolderConfigError::MissingAuthKey);
        }

        Ok(Self {
            folders: folders
                .into_iter()
                .map(|(key, folder)| (key, Arc::new(folder)))
                .collect(),
            auth_key,
        })
    }

    /// A registry with no folders; every request resolves to not found.
    pub fn empty() -> Self {
        Self {
            folders: HashMap::new(),
            auth_key: String::new(),
        }
    }

    /// Parses and validates a JSON definitions document.
    pub fn from_json(json: &str) -> Result<Self, FolderConfigError> {
        let definitions: FolderDefinitions = serde_json::from_str(json)?;
        Self::new(definitions.folders, definitions.auth_key)
    }

    /// Reads, parses and validates the definitions file at `path`.
    pub fn load(path: &Path) -> Result<Self, FolderConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| FolderConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Maps a decoded URL path to its folder and the file name relative to that folder.
    ///
    /// `/storage/<key>/<name>` resolves to the folder registered as `<key>/` and `<name>`.
    pub fn resolve(&self, path: &str) -> Result<(Arc<FolderConfig>, String), ResolveError> {
        let rest = path
            .strip_prefix(STORAGE_PREFIX)
            .ok_or_else(|| ResolveError::MissingPrefix(path.to_string()))?;

        let split = rest
            .find('/')
            .ok_or_else(|| ResolveError::MissingFolderKey(path.to_string()))?;
        let (key, file_name) = rest.split_at(split + 1);

        let folder = self
            .folders
            .get(key)
            .ok_or_else(|| ResolveError::UnknownFolder {
                key: key.to_string(),
                path: path.to_string(),
            })?;

        if !is_canonical_name(file_name) {
            return Err(ResolveError::InvalidFileName(file_name.to_string()));
        }

        debug!(
            "Resolved {} to folder {} (dir: {}, max-age: {})",
            path,
            key,
            folder.directory.display(),
            folder.max_age
        );

        Ok((Arc::clone(folder), file_name.to_string()))
    }

    pub fn folder(&self, key: &str) -> Option<&Arc<FolderConfig>> {
        self.folders.get(key)
    }

    /// Signing key for bearer tokens.
    pub fn auth_key(&self) -> &[u8] {
        self.auth_key.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

fn is_folder_key(key: &str) -> bool {
    key.len() > 1 && key.ends_with('/') && key.matches('/').count() == 1
}

/// True when `name` is exactly the relative path that reaches disk:
/// every `/`-separated segment is a plain name.
///
/// `Path::components` drops empty and `.` segments, so they are checked on the raw string.
fn is_canonical_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..")
        && Path::new(name)
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Shared handle to the current registry snapshot.
///
/// Readers take an `Arc` to the snapshot and keep using it for the rest of the
/// request, even if a reload publishes a new one meanwhile.
#[derive(Clone)]
pub struct SharedRegistry {
    current: Arc<watch::Sender<Arc<FolderRegistry>>>,
}

impl SharedRegistry {
    pub fn new(initial: FolderRegistry) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            current: Arc::new(current),
        }
    }

    /// The registry currently in effect.
    pub fn snapshot(&self) -> Arc<FolderRegistry> {
        Arc::clone(&self.current.borrow())
    }

    /// Publishes `next`, replacing the previous snapshot as a whole.
    pub fn replace(&self, next: FolderRegistry) {
        info!("Publishing folder registry with {} folder(s)", next.len());
        self.current.send_replace(Arc::new(next));
    }

    /// Loads `path` and publishes it. On failure the current snapshot stays in effect.
    pub fn reload_from(&self, path: &Path) -> Result<(), FolderConfigError> {
        let next = FolderRegistry::load(path)?;
        self.replace(next);
        Ok(())
    }

    /// Receiver that is notified each time a new snapshot is published.
    pub fn subscribe(&self) -> watch::Receiver<Arc<FolderRegistry>> {
        self.current.subscribe()
    }
}
