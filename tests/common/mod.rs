//! Shared test fixtures: instrumented collaborator fakes and request helpers
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;

use medscribe::config::Config;
use medscribe::services::{
    BlobStore, ChatClient, EmbeddingClient, ReportGenerator, ServiceError, TranscriptionClient,
};
use medscribe::AppState;

pub const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

/// Blob store fake that captures every stored artifact's bytes
#[derive(Default)]
pub struct CapturingBlobStore {
    pub puts: Mutex<Vec<(String, Vec<u8>)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl BlobStore for CapturingBlobStore {
    async fn put(
        &self,
        source: &Path,
        dest_name: &str,
        _content_type: &str,
    ) -> Result<String, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Network("blob store unavailable".to_string()));
        }
        let bytes = tokio::fs::read(source).await?;
        self.puts
            .lock()
            .unwrap()
            .push((dest_name.to_string(), bytes));
        Ok(format!("http://blob.test/audio/{dest_name}"))
    }
}

/// Transcription fake that counts invocations; a non-zero delay simulates a
/// slow real transcription call.
#[derive(Default)]
pub struct CountingTranscriber {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay_ms: AtomicU64,
}

#[async_trait]
impl TranscriptionClient for CountingTranscriber {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        _filename: &str,
        _mime_type: &str,
    ) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Api(500, "whisper down".to_string()));
        }
        Ok("Patient reports symptom of mild headache.\n\nTreatment is rest.".to_string())
    }
}

pub struct FakeEmbeddings;

#[async_trait]
impl EmbeddingClient for FakeEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

pub struct FakeChat;

#[async_trait]
impl ChatClient for FakeChat {
    async fn complete(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
    ) -> Result<String, ServiceError> {
        Ok("MEDICAL REPORT".to_string())
    }
}

/// One fully wired test application over fakes and a temp data root
pub struct TestApp {
    pub state: AppState,
    pub blob_store: Arc<CapturingBlobStore>,
    pub transcriber: Arc<CountingTranscriber>,
    // Held for its Drop; removes the data root
    #[allow(dead_code)]
    pub root: TempDir,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

/// Build a test app, letting the caller adjust config knobs first
pub async fn test_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let root = TempDir::new().unwrap();
    let mut config = Config::for_root(root.path());
    tweak(&mut config);

    let db = sqlx::SqlitePool::connect(":memory:").await.unwrap();
    medscribe::db::init_tables(&db).await.unwrap();

    let blob_store = Arc::new(CapturingBlobStore::default());
    let transcriber = Arc::new(CountingTranscriber::default());
    let report_generator = Arc::new(ReportGenerator::new(
        Arc::new(FakeEmbeddings),
        Arc::new(FakeChat),
    ));

    let state = AppState::with_collaborators(
        Arc::new(config),
        db,
        blob_store.clone(),
        transcriber.clone(),
        report_generator,
    );

    TestApp {
        state,
        blob_store,
        transcriber,
        root,
    }
}

/// Hand-built multipart body: text fields plus an optional file part
pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &str, &[u8])>,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    if let Some((name, filename, content_type, bytes)) = file {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Read a response body as JSON
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A chunk-upload request for one chunk of a session
pub fn chunk_request(session_id: &str, index: u32, total: u32, payload: &[u8]) -> Request<Body> {
    let index_text = index.to_string();
    let total_text = total.to_string();
    let body = multipart_body(
        &[
            ("sessionId", session_id),
            ("chunkIndex", &index_text),
            ("totalChunks", &total_text),
            ("filename", "visit.m4a"),
            ("mimeType", "audio/mp4"),
        ],
        Some(("audioChunk", "blob", "application/octet-stream", payload)),
    );
    multipart_request("/upload-audio-chunk", body)
}
