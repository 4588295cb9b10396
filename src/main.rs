//! Storage server - Entry Point
//!
//! Serves, stores and deletes files grouped into configured folders over HTTP.

use env_logger::Env;
use log::info;

use storage_server::{ServerConfig, StorageError, StorageServer};

#[tokio::main]
async fn main() -> Result<(), StorageError> {
    let config = ServerConfig::load();

    // The configured level is only a default; RUST_LOG still takes precedence.
    let default_level = config
        .as_ref()
        .map(|config| config.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let config = config?;
    info!("Launching storage server...");

    let server = StorageServer::new(config)?;
    server.start().await
}
