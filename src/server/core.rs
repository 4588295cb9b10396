//! Server lifecycle
//!
//! Startup wiring of registry, cache and background watchers, then the
//! HTTP accept loop until shutdown.

use log::{error, info, warn};
use tokio::net::TcpListener;

use crate::cache::{FileCache, Invalidator};
use crate::config::ServerConfig;
use crate::error::StorageError;
use crate::folders::{FolderRegistry, SharedRegistry, watch_folders_file};
use crate::server::routes::build_router;
use crate::server::state::AppState;

pub struct StorageServer {
    config: ServerConfig,
    state: AppState,
    invalidator: Invalidator,
}

impl StorageServer {
    /// Loads folder definitions and sets up the watched file cache.
    ///
    /// Unreadable definitions are not fatal: the server starts with no folders
    /// and picks up the file once it becomes valid.
    pub fn new(config: ServerConfig) -> Result<Self, StorageError> {
        let folders_file = config.folders_file_path();
        let registry = match FolderRegistry::load(&folders_file) {
            Ok(registry) => {
                info!(
                    "Loaded {} folder(s) from {}",
                    registry.len(),
                    folders_file.display()
                );
                registry
            }
            Err(e) => {
                error!("Starting without folders: {e}");
                FolderRegistry::empty()
            }
        };

        let (cache, invalidator) = FileCache::with_notify()?;
        let state = AppState::new(
            SharedRegistry::new(registry),
            cache,
            config.max_file_size_bytes(),
        );

        Ok(Self {
            config,
            state,
            invalidator,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serves requests until Ctrl-C, then stops the background tasks.
    pub async fn start(self) -> Result<(), StorageError> {
        let socket = self.config.listen_socket();
        let listener = TcpListener::bind(&socket).await?;
        info!(
            "Storage server listening on {} (uploads up to {} MB)",
            socket, self.config.max_file_size_mb
        );

        let invalidation = tokio::spawn(self.invalidator.run());

        let reloader = if self.config.watch_folders_file {
            match watch_folders_file(
                self.config.folders_file_path(),
                self.state.registry.clone(),
            ) {
                Ok(reloader) => Some(reloader),
                Err(e) => {
                    warn!("Folder definitions will not be reloaded: {e}");
                    None
                }
            }
        } else {
            None
        };

        let result = axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(reloader) = reloader {
            reloader.stop();
        }
        invalidation.abort();
        info!("Storage server stopped");

        result.map_err(StorageError::from)
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            error!("Cannot listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}
