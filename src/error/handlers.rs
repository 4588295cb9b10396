//! Error handlers
//!
//! Maps errors to HTTP status codes and logs them with request context.

use axum::http::{Method, StatusCode};
use log::{error, warn};

use crate::error::types::{CacheError, StorageError};

/// Log a failed request.
///
/// Denials are expected traffic and logged at warn level; everything else is an error.
pub fn handle_error(method: &Method, path: &str, err: &StorageError) {
    match err {
        StorageError::Forbidden(_) | StorageError::MethodNotAllowed(_) => {
            warn!("{method} {path} refused: {err}")
        }
        _ => error!("{method} {path} failed: {err}"),
    }
}

/// Convert error to HTTP status code
pub fn error_to_status(err: &StorageError) -> StatusCode {
    match err {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::Forbidden(_) => StatusCode::FORBIDDEN,
        StorageError::Cache(CacheError::NotFound { .. }) => StatusCode::NOT_FOUND,
        StorageError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StorageError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
        StorageError::RequestBody(_)
        | StorageError::FolderConfig(_)
        | StorageError::Settings(_)
        | StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
