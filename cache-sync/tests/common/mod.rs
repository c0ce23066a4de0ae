//! In-process fake object store for transfer tests.
//!
//! `GET /{key}` serves stored objects, `PUT /{key}` stores the body. Keys
//! can be marked as failing (HTTP 500) or as aborting mid-body.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use cache_sync::fs::hash::hash_bytes;
use cache_sync::manifest::{FileEntry, Manifest};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

pub const STATS_KEY: &str = "cache/v1/20241001T000000Z/20241101T000000Z/downloads/stats.json";
pub const DATA_KEY: &str = "cache/v1/20241001T000000Z/20241101T000000Z/downloads/data.parquet";

/// Valid cache key for `dataset`'s stats file.
pub fn stats_key(dataset: &str) -> String {
    format!("cache/v1/20241001T000000Z/20241101T000000Z/{dataset}/stats.json")
}

#[derive(Default)]
struct StoreState {
    objects: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    aborting: HashSet<String>,
    authorizations: Vec<Option<String>>,
    gets: usize,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn insert(&self, path: &str, content: &[u8]) {
        self.state.lock().unwrap().objects.insert(path.to_string(), content.to_vec());
    }

    /// Answer every request for `path` with HTTP 500.
    pub fn fail(&self, path: &str) {
        self.state.lock().unwrap().failing.insert(path.to_string());
    }

    /// Send part of the object for `path`, then drop the connection.
    pub fn abort(&self, path: &str) {
        self.state.lock().unwrap().aborting.insert(path.to_string());
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(path).cloned()
    }

    pub fn authorizations(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().authorizations.clone()
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }
}

async fn get_object(State(store): State<FakeStore>, Path(key): Path<String>) -> Response {
    let mut state = store.state.lock().unwrap();
    state.gets += 1;
    if state.failing.contains(&key) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    let Some(content) = state.objects.get(&key).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if state.aborting.contains(&key) {
        let half = content[..content.len() / 2].to_vec();
        let chunks: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from(half)),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "aborted")),
        ];
        return Body::from_stream(futures_util::stream::iter(chunks)).into_response();
    }

    content.into_response()
}

async fn put_object(
    State(store): State<FakeStore>,
    Path(key): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let mut state = store.state.lock().unwrap();
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.authorizations.push(authorization);

    if state.failing.contains(&key) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    state.objects.insert(key, body.to_vec());
    StatusCode::OK
}

/// Start the store on an ephemeral port and return its base URL.
pub async fn spawn_store(store: FakeStore) -> String {
    let app = Router::new()
        .route("/{*key}", get(get_object).put(put_object))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Serve `content` at `objects/<key>` and record it in `manifest`.
pub fn publish(store: &FakeStore, manifest: &mut Manifest, base_url: &str, key: &str, content: &[u8]) {
    let path = format!("objects/{key}");
    store.insert(&path, content);
    manifest.record(
        key,
        FileEntry {
            sha256: hash_bytes(content),
            url: format!("{base_url}/{path}"),
        },
    );
}

pub fn write_local(data_dir: &FsPath, key: &str, content: &[u8]) {
    let path = data_dir.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Leftover `.download-*` temp files anywhere under `root`.
pub fn partial_files(root: &FsPath) -> Vec<String> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(".download-"))
        .map(|e| e.path().display().to_string())
        .collect()
}
