//! Ingestion pipeline
//!
//! One artifact in, one recording out. The pipeline checks the dedup cache,
//! uploads the artifact to the blob store, runs transcription and report
//! generation unless skipped, persists the record, and registers the result
//! signature. The artifact temp file is consumed on every path, success or
//! failure, and nothing is persisted unless every preceding stage succeeded.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::dedup::{DedupClaim, DeduplicationCache, Signature};
use crate::error::{ApiError, ApiResult};
use crate::models::{RecordingMetadata, RecordingRecord};
use crate::services::{BlobStore, ReportGenerator, ServiceError, TranscriptionClient};
use crate::upload::TempFileGuard;

/// Provenance of the artifact entering the pipeline
#[derive(Debug, Clone)]
pub struct ArtifactMetadata {
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub user_id: Option<String>,
    /// Chunk count when the artifact was reassembled from a chunked upload
    pub chunk_count: Option<u32>,
}

/// Per-request processing switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOptions {
    /// Skip transcription and report generation; the recording persists with
    /// metadata only.
    pub skip_ai: bool,
}

/// What the pipeline produced for a request
#[derive(Debug)]
pub enum PipelineOutcome {
    /// A fresh recording was created
    Completed(RecordingRecord),
    /// The signature matched a recent run; nothing was re-processed
    Duplicate {
        recording_id: String,
        original_timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Orchestrates storage, AI processing, and persistence for one artifact
pub struct IngestPipeline {
    db: SqlitePool,
    blob_store: Arc<dyn BlobStore>,
    transcription: Arc<dyn TranscriptionClient>,
    report_generator: Arc<ReportGenerator>,
    dedup: DeduplicationCache,
    dedup_window: Duration,
}

impl IngestPipeline {
    pub fn new(
        db: SqlitePool,
        blob_store: Arc<dyn BlobStore>,
        transcription: Arc<dyn TranscriptionClient>,
        report_generator: Arc<ReportGenerator>,
        dedup: DeduplicationCache,
        dedup_window: Duration,
    ) -> Self {
        Self {
            db,
            blob_store,
            transcription,
            report_generator,
            dedup,
            dedup_window,
        }
    }

    /// Run the full pipeline for the artifact at `artifact_path`.
    ///
    /// Takes ownership of the artifact file: it is deleted before this
    /// returns, on every path.
    pub async fn process(
        &self,
        artifact_path: PathBuf,
        metadata: ArtifactMetadata,
        signature: Signature,
        options: ProcessOptions,
    ) -> ApiResult<PipelineOutcome> {
        // Guard stays armed for the whole run; the local artifact has no
        // value once the blob store holds a copy or the run failed.
        let _artifact = TempFileGuard::new(artifact_path.clone());

        // Single-flight: one claimant per signature executes, concurrent
        // claimants wait and receive its result. If this run fails, dropping
        // the reservation lets a retry execute.
        let reservation = match self.dedup.claim(&signature, self.dedup_window).await {
            DedupClaim::Run(reservation) => reservation,
            DedupClaim::Duplicate(entry) => {
                tracing::info!(
                    signature = %signature,
                    recording_id = %entry.recording_id,
                    "Duplicate request; returning prior recording"
                );
                return Ok(PipelineOutcome::Duplicate {
                    recording_id: entry.recording_id,
                    original_timestamp: entry.recorded_at_utc,
                });
            }
        };

        let filename = storage_filename(&metadata.original_filename);
        let path = format!("audio/{filename}");

        let storage_url = self
            .blob_store
            .put(&artifact_path, &filename, &metadata.mime_type)
            .await
            .map_err(|e| ApiError::StorageUpload(e.to_string()))?;

        let (transcript, report) = if options.skip_ai {
            tracing::info!(filename = %filename, "AI processing skipped by request");
            (None, None)
        } else {
            let transcript = self
                .transcription
                .transcribe(&artifact_path, &metadata.original_filename, &metadata.mime_type)
                .await
                .map_err(|e| ApiError::Transcription(e.to_string()))?;

            let report = self
                .report_generator
                .generate(&transcript)
                .await
                .map_err(|e| match e {
                    ServiceError::EmptyInput(msg) => ApiError::BadRequest(msg),
                    other => ApiError::ReportGeneration(other.to_string()),
                })?;

            (Some(transcript), Some(report))
        };

        let record = RecordingRecord {
            id: Uuid::new_v4().to_string(),
            filename,
            path,
            storage_url,
            size_bytes: metadata.size_bytes,
            uploaded_at: Utc::now(),
            transcript,
            report,
            user_id: metadata.user_id.clone(),
            metadata: RecordingMetadata {
                original_filename: metadata.original_filename.clone(),
                mime_type: metadata.mime_type.clone(),
                from_chunks: metadata.chunk_count.is_some(),
                chunks: metadata.chunk_count,
            },
        };

        crate::db::recordings::insert_recording(&self.db, &record).await?;
        reservation.complete(record.id.clone());

        tracing::info!(
            recording_id = %record.id,
            size_bytes = record.size_bytes,
            from_chunks = record.metadata.from_chunks,
            "Pipeline run complete"
        );
        Ok(PipelineOutcome::Completed(record))
    }
}

/// Collision-resistant storage name: fresh uuid plus the original extension
fn storage_filename(original_filename: &str) -> String {
    match Path::new(original_filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}
