//! # Medscribe Ingestion Service
//!
//! HTTP backend for a mobile dictation recorder. Accepts audio either as one
//! multipart request or as a resumable chunked upload, reassembles chunked
//! sessions into byte-exact artifacts, deduplicates retried requests, runs
//! transcription and medical report generation through OpenAI, and persists
//! recording records in SQLite.

pub mod api;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod upload;

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::DefaultBodyLimit, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::dedup::DeduplicationCache;
use crate::pipeline::IngestPipeline;
use crate::services::{
    BlobStore, LocalBlobStore, OpenAiClient, ReportGenerator, TranscriptionClient,
};
use crate::upload::store::UploadSessionStore;

pub use error::{ApiError, ApiResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<Config>,
    pub sessions: UploadSessionStore,
    pub dedup: DeduplicationCache,
    pub pipeline: Arc<IngestPipeline>,
    blob_store: Arc<dyn BlobStore>,
    openai: OpenAiClient,
    pub startup_time: Instant,
}

impl AppState {
    /// Production wiring: local blob store plus one OpenAI client backing
    /// all three AI collaborator roles.
    pub fn new(config: Arc<Config>, db: SqlitePool) -> Self {
        let openai = OpenAiClient::new(config.openai_api_key.clone());
        let openai_shared = Arc::new(openai.clone());
        let blob_store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(
            config.audio_dir(),
            config.public_base_url.clone(),
        ));
        let report_generator = Arc::new(ReportGenerator::new(
            openai_shared.clone(),
            openai_shared.clone(),
        ));
        let dedup = DeduplicationCache::new();
        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            blob_store.clone(),
            openai_shared,
            report_generator,
            dedup.clone(),
            config.dedup_window,
        ));

        Self {
            db,
            sessions: UploadSessionStore::new(config.chunks_dir(), config.tmp_dir()),
            dedup,
            pipeline,
            blob_store,
            openai,
            config,
            startup_time: Instant::now(),
        }
    }

    /// Test wiring: caller supplies the collaborators
    pub fn with_collaborators(
        config: Arc<Config>,
        db: SqlitePool,
        blob_store: Arc<dyn BlobStore>,
        transcription: Arc<dyn TranscriptionClient>,
        report_generator: Arc<ReportGenerator>,
    ) -> Self {
        let dedup = DeduplicationCache::new();
        let pipeline = Arc::new(IngestPipeline::new(
            db.clone(),
            blob_store.clone(),
            transcription,
            report_generator,
            dedup.clone(),
            config.dedup_window,
        ));

        Self {
            db,
            sessions: UploadSessionStore::new(config.chunks_dir(), config.tmp_dir()),
            dedup,
            pipeline,
            blob_store,
            openai: OpenAiClient::new(None),
            config,
            startup_time: Instant::now(),
        }
    }

    /// The pipeline to run a request through. A non-empty per-request API key
    /// rebuilds the AI collaborators around that key; everything else (blob
    /// store, database, dedup cache) is shared with the default pipeline.
    pub fn pipeline_for(&self, api_key: Option<String>) -> Arc<IngestPipeline> {
        let Some(key) = api_key.filter(|k| !k.trim().is_empty()) else {
            return self.pipeline.clone();
        };

        let keyed = Arc::new(self.openai.with_api_key(key));
        let report_generator = Arc::new(ReportGenerator::new(keyed.clone(), keyed.clone()));
        Arc::new(IngestPipeline::new(
            self.db.clone(),
            self.blob_store.clone(),
            keyed,
            report_generator,
            self.dedup.clone(),
            self.config.dedup_window,
        ))
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Body limit sits above the configured chunk cap so oversize payloads
    // reach the handler's explicit 413 with its structured body; the extra
    // megabyte covers multipart framing.
    let body_limit = (state.config.max_chunk_bytes as usize).saturating_add(1024 * 1024);

    Router::new()
        .merge(api::health::routes())
        .merge(api::chunks::routes())
        .merge(api::upload::routes())
        .merge(api::recordings::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
