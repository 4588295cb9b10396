//! Request handling
//!
//! Every request under the storage prefix goes through the same pipeline:
//! resolve the folder, check access, run the cache operation for the method,
//! respond. Failures become bare status codes.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, EXPIRES};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use log::debug;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use crate::auth::{check_authorization, check_read_access, unix_now};
use crate::error::{ResolveError, StorageError, error_to_status, handle_error};
use crate::folders::{FolderConfig, FolderRegistry};
use crate::server::state::AppState;

/// `Expires` is capped at one year ahead regardless of the folder's max-age.
const MAX_EXPIRES_SECS: u64 = 365 * 24 * 60 * 60;

/// Build the router serving all folders.
pub fn build_router(state: AppState) -> Router {
    Router::new().fallback(serve_file).with_state(state)
}

/// Entry point for every request.
pub async fn serve_file(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    match dispatch(&state, parts, body).await {
        Ok(response) => {
            debug!("{method} {path} -> {}", response.status());
            response
        }
        Err(err) => {
            handle_error(&method, &path, &err);
            error_to_status(&err).into_response()
        }
    }
}

async fn dispatch(state: &AppState, parts: Parts, body: Body) -> Result<Response, StorageError> {
    let raw_path = parts.uri.path();
    let path = urlencoding::decode(raw_path)
        .map_err(|_| ResolveError::InvalidFileName(raw_path.to_string()))?;

    // Held for the whole request, so a concurrent reload cannot change the folder mid-flight.
    let registry = state.registry.snapshot();
    let (folder, file_name) = registry.resolve(&path)?;
    let now = unix_now();

    match parts.method.clone() {
        Method::GET => get_file(state, &folder, &file_name, &parts.uri, now).await,
        Method::PUT => put_file(state, &registry, &folder, &file_name, &parts, body, now).await,
        Method::DELETE => delete_file(state, &registry, &folder, &file_name, &parts, now).await,
        other => Err(StorageError::MethodNotAllowed(other)),
    }
}

async fn get_file(
    state: &AppState,
    folder: &FolderConfig,
    file_name: &str,
    uri: &Uri,
    now: i64,
) -> Result<Response, StorageError> {
    let query = first_query_values(uri);
    check_read_access(folder, file_name, &query, now)?;

    let data = state.cache.get(&folder.file_path(file_name)).await?;

    let lifetime = Duration::from_secs(folder.max_age.min(MAX_EXPIRES_SECS));
    let expires = httpdate::fmt_http_date(SystemTime::now() + lifetime);

    Ok((
        [(CACHE_CONTROL, folder.cache_control()), (EXPIRES, expires)],
        data,
    )
        .into_response())
}

async fn put_file(
    state: &AppState,
    registry: &FolderRegistry,
    folder: &FolderConfig,
    file_name: &str,
    parts: &Parts,
    body: Body,
    now: i64,
) -> Result<Response, StorageError> {
    authorize(registry, parts, now)?;

    let data = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(StorageError::RequestBody)?;
    state.cache.put(&folder.file_path(file_name), data).await?;

    Ok(StatusCode::OK.into_response())
}

async fn delete_file(
    state: &AppState,
    registry: &FolderRegistry,
    folder: &FolderConfig,
    file_name: &str,
    parts: &Parts,
    now: i64,
) -> Result<Response, StorageError> {
    authorize(registry, parts, now)?;

    state.cache.delete(&folder.file_path(file_name)).await?;

    Ok(StatusCode::OK.into_response())
}

/// Query parameters keyed by name. A repeated parameter keeps its first value.
fn first_query_values(uri: &Uri) -> HashMap<String, String> {
    let pairs = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let mut query = HashMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        query.entry(name).or_insert(value);
    }
    query
}

fn authorize(registry: &FolderRegistry, parts: &Parts, now: i64) -> Result<(), StorageError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    check_authorization(header, now, registry.auth_key())?;
    Ok(())
}
