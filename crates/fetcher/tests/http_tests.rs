//! HTTP fetch tests against a local axum server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use fetcher::download::partial_path;
use fetcher::{ClientConfig, Downloader, FetchError, FetchOptions, Source};
use tempfile::TempDir;

const PAYLOAD_LEN: usize = 64 * 1024;

#[derive(Clone, Default)]
struct ServerState {
    ranges: Arc<Mutex<Vec<String>>>,
}

fn payload() -> Vec<u8> {
    (0..PAYLOAD_LEN).map(|i| (i % 251) as u8).collect()
}

/// Serves the payload, honoring `Range: bytes=N-` with a 206.
async fn serve_payload(State(state): State<ServerState>, headers: HeaderMap) -> impl IntoResponse {
    let body = payload();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match range.as_deref().and_then(|r| r.strip_prefix("bytes=")) {
        Some(bytes) => {
            state.ranges.lock().unwrap().push(bytes.to_string());
            let start: usize = bytes.trim_end_matches('-').parse().unwrap_or(0);
            let content_range = format!("bytes {}-{}/{}", start, body.len() - 1, body.len());
            (
                StatusCode::PARTIAL_CONTENT,
                [(header::CONTENT_RANGE, content_range)],
                body[start..].to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::OK, body).into_response(),
    }
}

async fn spawn_server() -> (SocketAddr, ServerState) {
    let state = ServerState::default();
    let app = Router::new()
        .route("/files/data.bin", get(serve_payload))
        .route("/missing.bin", get(|| async { StatusCode::NOT_FOUND }))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn downloader() -> Downloader {
    let config = ClientConfig {
        max_retries: 0,
        initial_retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(10),
        ..ClientConfig::default()
    };
    Downloader::http(config).unwrap()
}

#[tokio::test]
async fn test_plain_download() {
    let (addr, state) = spawn_server().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("copy.bin");

    let path = downloader()
        .download_file(
            &Source::url(format!("http://{}/files/data.bin", addr)),
            Some(&output),
            &FetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(path, output);
    assert_eq!(std::fs::read(&output).unwrap(), payload());
    assert!(!partial_path(&output).exists());
    assert!(state.ranges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_directory_output_uses_url_basename() {
    let (addr, _state) = spawn_server().await;
    let dir = TempDir::new().unwrap();

    let path = downloader()
        .download_file(
            &Source::url(format!("http://{}/files/data.bin?v=2", addr)),
            Some(dir.path()),
            &FetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("data.bin"));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), PAYLOAD_LEN as u64);
}

#[tokio::test]
async fn test_resume_continues_partial_file() {
    let (addr, state) = spawn_server().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("resumed.bin");
    let head = 10_000;
    std::fs::write(partial_path(&output), &payload()[..head]).unwrap();

    let options = FetchOptions {
        resume: true,
        ..FetchOptions::default()
    };
    downloader()
        .download_file(
            &Source::url(format!("http://{}/files/data.bin", addr)),
            Some(&output),
            &options,
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), payload());
    assert_eq!(*state.ranges.lock().unwrap(), vec![format!("{}-", head)]);
}

#[tokio::test]
async fn test_stale_partial_discarded_without_resume() {
    let (addr, state) = spawn_server().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("fresh.bin");
    std::fs::write(partial_path(&output), b"garbage").unwrap();

    downloader()
        .download_file(
            &Source::url(format!("http://{}/files/data.bin", addr)),
            Some(&output),
            &FetchOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&output).unwrap(), payload());
    assert!(state.ranges.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let (addr, _state) = spawn_server().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("missing.bin");

    let err = downloader()
        .download_file(
            &Source::url(format!("http://{}/missing.bin", addr)),
            Some(&output),
            &FetchOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
    assert!(!output.exists());
}
