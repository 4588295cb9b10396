use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, EXPIRES};
use axum::http::{Request, Response, StatusCode};
use bytes::Bytes;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

use storage_server::auth::{signed_query, unix_now};
use storage_server::cache::{CacheEntry, FileCache, PathWatcher};
use storage_server::error::FolderConfigError;
use storage_server::folders::{FolderRegistry, SharedRegistry, watch_folders_file};
use storage_server::server::{AppState, build_router};

const AUTH_KEY: &str = "bearer-signing-key";
const MAX_AGE: u64 = 3600;

/// Watcher that never reports anything, so tests control invalidation.
struct NoopWatcher;

impl PathWatcher for NoopWatcher {
    fn watch(&mut self, _path: &Path) -> notify::Result<()> {
        Ok(())
    }

    fn unwatch(&mut self, _path: &Path) -> notify::Result<()> {
        Ok(())
    }
}

struct TestServer {
    _dir: TempDir,
    folder_dir: PathBuf,
    state: AppState,
}

fn definitions(folder_dir: &Path) -> String {
    json!({
        "folders": {
            "a/": {
                "dir": folder_dir,
                "maxAge": MAX_AGE,
                "private": { "secret": "k", "pathes": ["secret/", "docs/private/"] }
            }
        },
        "authKey": AUTH_KEY
    })
    .to_string()
}

fn setup() -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let folder_dir = dir.path().join("a");
    std::fs::create_dir_all(&folder_dir).unwrap();

    let registry = FolderRegistry::from_json(&definitions(&folder_dir)).unwrap();
    let state = AppState::new(
        SharedRegistry::new(registry),
        Arc::new(FileCache::new(NoopWatcher)),
        1024,
    );

    TestServer {
        _dir: dir,
        folder_dir,
        state,
    }
}

impl TestServer {
    async fn send(&self, request: Request<Body>) -> Response<Body> {
        build_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap()
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn put(&self, uri: &str, token: Option<&str>, body: impl Into<Body>) -> Response<Body> {
        let mut request = Request::put(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(body.into()).unwrap()).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> Response<Body> {
        let mut request = Request::delete(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.folder_dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }
}

fn bearer(expires_in: i64) -> String {
    encode(
        &Header::default(),
        &json!({ "exp": unix_now() + expires_in }),
        &EncodingKey::from_secret(AUTH_KEY.as_bytes()),
    )
    .unwrap()
}

async fn body_of(response: Response<Body>) -> Bytes {
    to_bytes(response.into_body(), usize::MAX).await.unwrap()
}

#[tokio::test]
async fn signed_link_grants_private_read() {
    let server = setup();
    server.write_file("secret/x.txt", b"classified");

    let query = signed_query("secret/x.txt", 9_999_999_999, "k").unwrap();
    let response = server.get(&format!("/storage/a/secret/x.txt?{query}")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, Bytes::from_static(b"classified"));
}

#[tokio::test]
async fn altered_signature_is_forbidden() {
    let server = setup();
    server.write_file("secret/x.txt", b"classified");

    let query = signed_query("secret/x.txt", 9_999_999_999, "k").unwrap();
    let last = query.chars().last().unwrap();
    let altered = format!(
        "{}{}",
        &query[..query.len() - 1],
        if last == '0' { '1' } else { '0' }
    );

    let response = server.get(&format!("/storage/a/secret/x.txt?{altered}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_of(response).await.is_empty());
}

#[tokio::test]
async fn private_read_without_signature_is_forbidden() {
    let server = setup();
    server.write_file("secret/x.txt", b"classified");

    let response = server.get("/storage/a/secret/x.txt").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn expired_link_is_forbidden() {
    let server = setup();
    server.write_file("secret/x.txt", b"classified");

    let query = signed_query("secret/x.txt", unix_now() - 10, "k").unwrap();
    let response = server.get(&format!("/storage/a/secret/x.txt?{query}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn public_read_depends_only_on_existence() {
    let server = setup();

    let response = server.get("/storage/a/public.txt").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.write_file("public.txt", b"hello");
    let response = server.get("/storage/a/public.txt?t=junk&e=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_of(response).await, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn put_then_get_serves_written_bytes_with_cache_headers() {
    let server = setup();
    let token = bearer(3600);

    let response = server
        .put("/storage/a/file.bin", Some(&token), b"0123456789".to_vec())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_of(response).await.is_empty());
    assert_eq!(
        std::fs::read(server.folder_dir.join("file.bin")).unwrap(),
        b"0123456789"
    );

    let response = server.get("/storage/a/file.bin").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CACHE_CONTROL).unwrap(),
        "public, max-age=3600"
    );
    let expires = response.headers().get(EXPIRES).unwrap().to_str().unwrap();
    assert!(httpdate::parse_http_date(expires).is_ok());
    assert_eq!(body_of(response).await, Bytes::from_static(b"0123456789"));
}

#[tokio::test]
async fn put_without_valid_token_is_forbidden() {
    let server = setup();

    let response = server.put("/storage/a/file.bin", None, "data").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = server
        .put("/storage/a/file.bin", Some(&bearer(-60)), "data")
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    assert!(!server.folder_dir.join("file.bin").exists());
}

#[tokio::test]
async fn expired_token_cannot_delete() {
    let server = setup();
    server
        .put("/storage/a/file.bin", Some(&bearer(3600)), b"0123456789".to_vec())
        .await;
    let path = server.folder_dir.join("file.bin");

    let response = server
        .delete("/storage/a/file.bin", Some(&bearer(-60)))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
    assert_eq!(
        server.state.cache.entry(&path).await,
        Some(CacheEntry::Cached(Bytes::from_static(b"0123456789")))
    );
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let server = setup();
    let token = bearer(3600);
    server
        .put("/storage/a/file.bin", Some(&token), "data")
        .await;

    let response = server.delete("/storage/a/file.bin", Some(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!server.folder_dir.join("file.bin").exists());

    let response = server.get("/storage/a/file.bin").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_missing_file_is_internal_error() {
    let server = setup();

    let response = server
        .delete("/storage/a/never-written", Some(&bearer(3600)))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let server = setup();

    let response = server
        .put("/storage/a/big.bin", Some(&bearer(3600)), vec![0u8; 4096])
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!server.folder_dir.join("big.bin").exists());
}

#[tokio::test]
async fn unresolvable_paths_are_not_found() {
    let server = setup();
    server.write_file("public.txt", b"hello");

    for uri in [
        "/other/a/public.txt",
        "/storage/a",
        "/storage/b/public.txt",
        "/storage/a/../a/public.txt",
        "/storage/a/%2E%2E/a/public.txt",
    ] {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn non_canonical_names_cannot_bypass_private_prefix() {
    let server = setup();
    server.write_file("docs/private/plan.txt", b"plan");

    let response = server.get("/storage/a/docs/private/plan.txt").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    for uri in [
        "/storage/a/docs//private/plan.txt",
        "/storage/a/docs/./private/plan.txt",
        "/storage/a/docs/%2F/private/plan.txt",
        "/storage/a/docs/%2E/private/plan.txt",
    ] {
        let response = server.get(uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }

    let query = signed_query("docs/private/plan.txt", 9_999_999_999, "k").unwrap();
    let response = server
        .get(&format!("/storage/a/docs/private/plan.txt?{query}"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn trailing_slash_names_are_not_found() {
    let server = setup();
    server.write_file("x", b"plain");

    let response = server.put("/storage/a/x/", Some(&bearer(3600)), "other").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(std::fs::read(server.folder_dir.join("x")).unwrap(), b"plain");

    let response = server.get("/storage/a/x/").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn definitions_without_auth_key_never_open_writes() {
    let server = setup();
    let keyless = json!({ "folders": { "a/": { "dir": server.folder_dir } } }).to_string();
    assert!(matches!(
        FolderRegistry::from_json(&keyless),
        Err(FolderConfigError::MissingAuthKey)
    ));

    let file = server.folder_dir.join("env.json");
    std::fs::write(&file, &keyless).unwrap();
    assert!(server.state.registry.reload_from(&file).is_err());

    let empty_key_token = encode(
        &Header::default(),
        &json!({ "exp": unix_now() + 3600 }),
        &EncodingKey::from_secret(b""),
    )
    .unwrap();
    let response = server
        .put("/storage/a/pwned.txt", Some(&empty_key_token), "data")
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!server.folder_dir.join("pwned.txt").exists());
}

#[tokio::test]
async fn repeated_signature_parameter_uses_first_value() {
    let server = setup();
    server.write_file("secret/x.txt", b"classified");

    let query = signed_query("secret/x.txt", 9_999_999_999, "k").unwrap();
    let response = server
        .get(&format!("/storage/a/secret/x.txt?{query}&t=bogus"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server
        .get(&format!("/storage/a/secret/x.txt?t=bogus&{query}"))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn percent_encoded_names_are_decoded() {
    let server = setup();

    let response = server
        .put("/storage/a/hello%20world.txt", Some(&bearer(3600)), "hi")
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(server.folder_dir.join("hello world.txt").exists());
}

#[tokio::test]
async fn unsupported_method_is_rejected() {
    let server = setup();

    let response = server
        .send(
            Request::post("/storage/a/file.bin")
                .body(Body::from("data"))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn requests_see_replaced_registry() {
    let server = setup();
    server.write_file("public.txt", b"hello");
    assert_eq!(
        server.get("/storage/a/public.txt").await.status(),
        StatusCode::OK
    );

    server.state.registry.replace(FolderRegistry::empty());

    assert_eq!(
        server.get("/storage/a/public.txt").await.status(),
        StatusCode::NOT_FOUND
    );
}

/// Polls `check` until it holds or a few seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
async fn external_modification_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("watched.txt");
    std::fs::write(&path, b"v1").unwrap();

    let (cache, invalidator) = FileCache::with_notify().unwrap();
    let task = tokio::spawn(invalidator.run());

    assert_eq!(cache.get(&path).await.unwrap(), Bytes::from_static(b"v1"));
    std::fs::write(&path, b"v2").unwrap();

    let reloaded = eventually(|| {
        let cache = Arc::clone(&cache);
        let path = path.clone();
        async move { cache.get(&path).await.ok() == Some(Bytes::from_static(b"v2")) }
    })
    .await;

    task.abort();
    assert!(reloaded, "cache kept serving stale contents");
}

#[tokio::test]
async fn definitions_file_is_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("env.json");
    std::fs::write(&file, definitions(&dir.path().join("a"))).unwrap();

    let registry = SharedRegistry::new(FolderRegistry::load(&file).unwrap());
    let reloader = watch_folders_file(file.clone(), registry.clone()).unwrap();

    // An invalid edit keeps the previous definitions.
    std::fs::write(&file, "{ broken").unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(registry.snapshot().folder("a/").is_some());

    let next = json!({ "folders": { "b/": { "dir": dir.path().join("b") } }, "authKey": "new" });
    std::fs::write(&file, next.to_string()).unwrap();

    let swapped = eventually(|| {
        let registry = registry.clone();
        async move { registry.snapshot().folder("b/").is_some() }
    })
    .await;

    reloader.stop();
    assert!(swapped, "registry was not reloaded");
    let snapshot = registry.snapshot();
    assert!(snapshot.folder("a/").is_none());
    assert_eq!(snapshot.auth_key(), b"new");
}
