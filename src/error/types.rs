//! Error types
//!
//! Defines domain-specific error types for each module of the storage server.

use std::io;
use std::path::PathBuf;

use axum::http::Method;
use thiserror::Error;

/// Folder resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("path is outside the storage prefix: {0}")]
    MissingPrefix(String),

    #[error("path has no folder key: {0}")]
    MissingFolderKey(String),

    #[error("unknown folder {key} in path {path}")]
    UnknownFolder { key: String, path: String },

    #[error("invalid file name: {0}")]
    InvalidFileName(String),
}

/// Reasons a read or write was refused.
///
/// Variants never carry token or secret material so they are safe to log.
#[derive(Debug, Error)]
pub enum AccessDenied {
    #[error("private path requires both a token and an expiry")]
    MissingSignature,

    #[error("expiry is not a unix timestamp")]
    MalformedExpiry,

    #[error("signed link expired at {expiry}")]
    LinkExpired { expiry: i64 },

    #[error("signature does not match")]
    SignatureMismatch,

    #[error("authorization header is missing")]
    MissingAuthorization,

    #[error("no signing key is configured")]
    NoSigningKey,

    #[error("bearer token is invalid: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("bearer token has no expiration claim")]
    MissingExpiration,

    #[error("bearer token expired")]
    TokenExpired,
}

/// File cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("file not found: {}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("change watcher error: {0}")]
    Watch(#[from] notify::Error),
}

/// Folder definition loading errors
#[derive(Debug, Error)]
pub enum FolderConfigError {
    #[error("failed to read folder definitions {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse folder definitions: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("folder key {0:?} must be a single segment ending in '/'")]
    InvalidKey(String),

    #[error("folder {0:?} has an empty directory")]
    EmptyDirectory(String),

    #[error("authKey must be set when folders are defined")]
    MissingAuthKey,
}

/// General storage server error that encompasses all error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(#[from] ResolveError),

    #[error("forbidden: {0}")]
    Forbidden(#[from] AccessDenied),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("configuration error: {0}")]
    FolderConfig(#[from] FolderConfigError),

    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(Method),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
