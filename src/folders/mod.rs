//! Folder registry
//!
//! Folder definitions, URL resolution and hot reload of the definitions file.

pub mod config;
pub mod registry;
pub mod reload;

pub use config::{FolderConfig, PrivateConfig};
pub use registry::{FolderRegistry, SharedRegistry, STORAGE_PREFIX};
pub use reload::{FoldersReloader, watch_folders_file};
