//! Configuration management for the storage server
//!
//! Process-level settings (listen socket, logging, upload limits) are loaded
//! once at startup. Folder definitions live in a separate file that is
//! hot-reloaded; see [`crate::folders`].

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Optional settings file, looked up in the working directory with any supported extension.
const SETTINGS_FILE: &str = "storage-server";
const ENV_PREFIX: &str = "STORAGE_SERVER";

/// Server settings (restart required)
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind the HTTP listener
    /// Environment: STORAGE_SERVER_BIND_ADDRESS
    pub bind_address: String,

    /// Port for the HTTP listener
    /// Environment: STORAGE_SERVER_PORT
    pub port: u16,

    /// JSON file holding folder definitions and the bearer signing key
    /// Environment: STORAGE_SERVER_FOLDERS_FILE
    pub folders_file: String,

    /// Default log filter, used when RUST_LOG is not set
    pub log_level: String,

    /// Maximum upload size in MB
    pub max_file_size_mb: u64,

    /// Reload folder definitions when the file changes
    pub watch_folders_file: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 9001,
            folders_file: "env.json".to_string(),
            log_level: "debug".to_string(),
            max_file_size_mb: 100,
            watch_folders_file: true,
        }
    }
}

impl ServerConfig {
    /// Load settings from defaults, the optional settings file and environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = Self::default();
        let settings = Config::builder()
            .set_default("bind_address", defaults.bind_address)?
            .set_default("port", defaults.port as i64)?
            .set_default("folders_file", defaults.folders_file)?
            .set_default("log_level", defaults.log_level)?
            .set_default("max_file_size_mb", defaults.max_file_size_mb as i64)?
            .set_default("watch_folders_file", defaults.watch_folders_file)?
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.port == 0 {
            return Err(config::ConfigError::Message("port cannot be 0".into()));
        }

        if self.bind_address.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "bind_address cannot be empty".into(),
            ));
        }

        if self.folders_file.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "folders_file cannot be empty".into(),
            ));
        }

        if self.max_file_size_mb == 0 {
            return Err(config::ConfigError::Message(
                "max_file_size_mb must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and port as a socket address string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Get the folder definitions file as PathBuf
    pub fn folders_file_path(&self) -> PathBuf {
        PathBuf::from(&self.folders_file)
    }

    /// Get maximum upload size in bytes
    pub fn max_file_size_bytes(&self) -> usize {
        (self.max_file_size_mb as usize).saturating_mul(1024 * 1024)
    }
}
