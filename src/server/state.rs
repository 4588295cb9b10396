//! Shared request state.

use std::sync::Arc;

use crate::cache::FileCache;
use crate::folders::SharedRegistry;

/// Everything a request handler needs, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub registry: SharedRegistry,
    pub cache: Arc<FileCache>,
    /// Upper bound on accepted upload bodies.
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(registry: SharedRegistry, cache: Arc<FileCache>, max_body_bytes: usize) -> Self {
        Self {
            registry,
            cache,
            max_body_bytes,
        }
    }
}
