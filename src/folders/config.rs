//! Module `config`
//!
//! Per-folder settings as they appear in the folder definitions file.

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

/// Settings of one named storage area.
#[derive(Debug, Clone, Deserialize)]
pub struct FolderConfig {
    /// Root directory of the folder's files.
    #[serde(rename = "dir")]
    pub directory: PathBuf,

    /// Cache lifetime advertised to clients, in seconds.
    #[serde(rename = "maxAge", alias = "max_age", default)]
    pub max_age: u64,

    #[serde(rename = "private", default)]
    pub private: PrivateConfig,
}

/// Read restrictions for a folder.
#[derive(Clone, Default, Deserialize)]
pub struct PrivateConfig {
    /// Key used to sign read links for private paths.
    #[serde(default)]
    pub secret: String,

    /// File name prefixes that require a signed link, in match order.
    #[serde(rename = "pathes", alias = "paths", alias = "prefixes", default)]
    pub prefixes: Vec<String>,
}

impl fmt::Debug for PrivateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateConfig")
            .field("secret", &"<redacted>")
            .field("prefixes", &self.prefixes)
            .finish()
    }
}

impl FolderConfig {
    /// Returns whether `file_name` falls under one of the private prefixes.
    pub fn is_private(&self, file_name: &str) -> bool {
        self.private
            .prefixes
            .iter()
            .any(|prefix| file_name.starts_with(prefix.as_str()))
    }

    /// Location of `file_name` on disk.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.directory.join(file_name)
    }

    /// Value of the `Cache-Control` header for files of this folder.
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age)
    }
}
