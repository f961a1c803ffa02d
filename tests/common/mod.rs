//! Shared helpers for integration tests
//!
//! A local axum server that serves generated artifact files with `ETag` and
//! `Content-Length` headers, counts requests and can be told to fail or to
//! stall part-way through a body.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tempfile::TempDir;

use model_fetcher::app::{
    ArtifactClient, ArtifactFetcher, ArtifactManager, CacheConfig, CacheManager, ClientConfig,
    DownloadProgress, ManagerConfig, ProgressCallback, WriteMode,
};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Clone)]
struct ServedFile {
    content: Bytes,
    etag: String,
}

#[derive(Clone, Default)]
struct ServerState {
    files: Arc<Mutex<HashMap<String, ServedFile>>>,
    failures: Arc<Mutex<HashMap<String, u16>>>,
    stall_after: Arc<Mutex<Option<usize>>>,
    gets: Arc<AtomicUsize>,
    heads: Arc<AtomicUsize>,
}

impl ServerState {
    fn lookup(&self, file: &str) -> Result<ServedFile, StatusCode> {
        if let Some(status) = self.failures.lock().unwrap().get(file) {
            return Err(StatusCode::from_u16(*status).unwrap());
        }
        self.files
            .lock()
            .unwrap()
            .get(file)
            .cloned()
            .ok_or(StatusCode::NOT_FOUND)
    }
}

/// Local artifact server bound to an ephemeral port
pub struct TestServer {
    addr: SocketAddr,
    state: ServerState,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = ServerState::default();
        let app = Router::new()
            .route("/{file}", get(get_file).head(head_file))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, file: &str) -> String {
        format!("http://{}/{}", self.addr, file)
    }

    /// Serve `size` generated bytes under `file`, returning the content
    pub fn add_file(&self, file: &str, size: usize) -> Bytes {
        let content = generate_content(file, size);
        self.state.files.lock().unwrap().insert(
            file.to_string(),
            ServedFile {
                content: content.clone(),
                etag: format!("\"{}-v1\"", file),
            },
        );
        content
    }

    /// Replace the content of `file` with a new version and ETag
    pub fn update_file(&self, file: &str, size: usize, etag: &str) -> Bytes {
        let content = generate_content(etag, size);
        self.state.files.lock().unwrap().insert(
            file.to_string(),
            ServedFile {
                content: content.clone(),
                etag: etag.to_string(),
            },
        );
        content
    }

    pub fn etag(&self, file: &str) -> String {
        self.state.files.lock().unwrap()[file].etag.clone()
    }

    /// Answer every request for `file` with `status`
    pub fn fail_with(&self, file: &str, status: u16) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(file.to_string(), status);
    }

    /// Send at most `bytes` of every body, then hang
    pub fn stall_after(&self, bytes: usize) {
        *self.state.stall_after.lock().unwrap() = Some(bytes);
    }

    pub fn get_count(&self) -> usize {
        self.state.gets.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.state.heads.load(Ordering::SeqCst)
    }
}

async fn head_file(State(state): State<ServerState>, Path(file): Path<String>) -> Response {
    state.heads.fetch_add(1, Ordering::SeqCst);
    match state.lookup(&file) {
        Ok(served) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, served.content.len())
            .header(header::ETAG, served.etag)
            .body(Body::empty())
            .unwrap(),
        Err(status) => status.into_response(),
    }
}

async fn get_file(State(state): State<ServerState>, Path(file): Path<String>) -> Response {
    state.gets.fetch_add(1, Ordering::SeqCst);
    let served = match state.lookup(&file) {
        Ok(served) => served,
        Err(status) => return status.into_response(),
    };

    let len = served.content.len();
    let limit = state.stall_after.lock().unwrap().unwrap_or(len).min(len);
    let chunks: Vec<Result<Bytes, Infallible>> = (0..limit)
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(served.content.slice(start..(start + CHUNK_SIZE).min(limit))))
        .collect();

    let body = if limit < len {
        Body::from_stream(stream::iter(chunks).chain(stream::pending()))
    } else {
        Body::from_stream(stream::iter(chunks))
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len)
        .header(header::ETAG, served.etag)
        .body(body)
        .unwrap()
}

fn generate_content(seed: &str, size: usize) -> Bytes {
    let offset = seed.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    (0..size)
        .map(|i| (i % 251) as u8 ^ offset)
        .collect::<Vec<u8>>()
        .into()
}

/// Client without meaningful rate limiting
pub fn test_client() -> Arc<ArtifactClient> {
    Arc::new(ArtifactClient::with_config(ClientConfig::default().with_rate_limit(1000)).unwrap())
}

pub async fn test_cache(temp_dir: &TempDir, mode: WriteMode) -> Arc<CacheManager> {
    let config = CacheConfig::with_cache_root(temp_dir.path().to_path_buf()).with_write_mode(mode);
    Arc::new(CacheManager::new(config).await.unwrap())
}

pub async fn test_fetcher(temp_dir: &TempDir) -> ArtifactFetcher {
    test_fetcher_with_mode(temp_dir, WriteMode::Auto).await
}

pub async fn test_fetcher_with_mode(temp_dir: &TempDir, mode: WriteMode) -> ArtifactFetcher {
    ArtifactFetcher::new(test_client(), test_cache(temp_dir, mode).await)
}

pub async fn test_manager(temp_dir: &TempDir) -> ArtifactManager {
    test_manager_with_mode(temp_dir, WriteMode::Auto).await
}

pub async fn test_manager_with_mode(temp_dir: &TempDir, mode: WriteMode) -> ArtifactManager {
    ArtifactManager::new(
        test_cache(temp_dir, mode).await,
        test_client(),
        ManagerConfig::default(),
    )
    .unwrap()
}

/// Progress callback that records every report
pub fn recording_progress() -> (ProgressCallback, Arc<Mutex<Vec<DownloadProgress>>>) {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    let callback: ProgressCallback = Arc::new(move |p: DownloadProgress| sink.lock().unwrap().push(p));
    (callback, reports)
}
