//! Chunked upload endpoints
//!
//! `POST /upload-audio-chunk` receives one chunk as multipart form data;
//! `POST /finalize-chunked-upload` reassembles a complete session and runs
//! the ingestion pipeline on the merged artifact.

use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::request_identity;
use crate::dedup::{fingerprint, FingerprintContext};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{ArtifactMetadata, PipelineOutcome, ProcessOptions};
use crate::upload::store::ChunkUpload;
use crate::AppState;

/// Build chunked-upload routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload-audio-chunk", post(upload_chunk))
        .route("/finalize-chunked-upload", post(finalize_chunked_upload))
}

/// **POST /upload-audio-chunk** - Store one chunk of a chunked upload
///
/// Multipart fields: `sessionId`, `chunkIndex` (1-based), `totalChunks`,
/// optional `filename` and `mimeType`, and the chunk payload as `audioChunk`.
async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut session_id: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;
    let mut filename: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut payload: Option<axum::body::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "sessionId" => session_id = Some(read_text(field).await?),
            "chunkIndex" => chunk_index = Some(read_u32(field, "chunkIndex").await?),
            "totalChunks" => total_chunks = Some(read_u32(field, "totalChunks").await?),
            "filename" => filename = Some(read_text(field).await?),
            "mimeType" => mime_type = Some(read_text(field).await?),
            "audioChunk" => {
                // The file part carries fallback metadata when the explicit
                // fields are absent.
                if filename.is_none() {
                    filename = field.file_name().map(str::to_string);
                }
                if mime_type.is_none() {
                    mime_type = field.content_type().map(str::to_string);
                }
                payload = Some(field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read chunk payload: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let mut missing = Vec::new();
    if session_id.is_none() {
        missing.push("sessionId");
    }
    if chunk_index.is_none() {
        missing.push("chunkIndex");
    }
    if total_chunks.is_none() {
        missing.push("totalChunks");
    }
    if payload.is_none() {
        missing.push("audioChunk");
    }
    if !missing.is_empty() {
        return Err(ApiError::MissingMetadata(missing.join(", ")));
    }

    let payload = payload.unwrap_or_default();
    if payload.len() as u64 > state.config.max_chunk_bytes {
        return Err(ApiError::PayloadTooLarge {
            size: payload.len() as u64,
            limit: state.config.max_chunk_bytes,
        });
    }

    let session_id = session_id.unwrap_or_default();
    let chunk_index = chunk_index.unwrap_or_default();
    let ack = state
        .sessions
        .receive_chunk(ChunkUpload {
            session_id: session_id.clone(),
            chunk_index,
            total_chunks: total_chunks.unwrap_or_default(),
            filename: filename.unwrap_or_else(|| "recording.m4a".to_string()),
            mime_type: mime_type.unwrap_or_else(|| "audio/mp4".to_string()),
            payload,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "sessionId": session_id,
        "chunkIndex": chunk_index,
        "totalChunks": ack.total_chunks,
        "received": ack.total_chunks - ack.remaining,
        "remainingChunks": ack.remaining,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeQuery {
    #[serde(rename = "skipAI")]
    skip_ai: Option<String>,
    api_key: Option<String>,
    client_id: Option<String>,
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeRequest {
    session_id: String,
    user_id: Option<String>,
    #[serde(rename = "skipAI")]
    skip_ai: Option<bool>,
}

/// **POST /finalize-chunked-upload** - Merge a complete session and ingest it
async fn finalize_chunked_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FinalizeQuery>,
    Json(request): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    let skip_ai =
        query.skip_ai.as_deref() == Some("true") || request.skip_ai.unwrap_or(false);

    let finalized = state.sessions.finalize(&request.session_id).await?;

    let (client_id, request_id) = request_identity(
        &headers,
        query.client_id.as_deref(),
        query.request_id.as_deref(),
    );
    let signature = fingerprint(
        &FingerprintContext {
            client_id: client_id.as_deref(),
            request_id: request_id.as_deref(),
            user_id: request.user_id.as_deref(),
            payload_size: finalized.size_bytes,
        },
        state.config.fingerprint_bucket,
    );

    let metadata = ArtifactMetadata {
        original_filename: finalized.original_filename,
        mime_type: finalized.mime_type,
        size_bytes: finalized.size_bytes,
        user_id: request.user_id,
        chunk_count: Some(finalized.chunk_count),
    };

    let pipeline = state.pipeline_for(query.api_key);
    let outcome = pipeline
        .process(
            finalized.artifact_path,
            metadata,
            signature,
            ProcessOptions { skip_ai },
        )
        .await?;

    Ok(Json(match outcome {
        PipelineOutcome::Completed(record) => json!({
            "success": true,
            "message": "File uploaded and processed successfully",
            "recordingId": record.id,
            "file": {
                "filename": record.filename,
                "path": record.path,
                "storageUrl": record.storage_url,
                "size": record.size_bytes,
            },
            "chunks": record.metadata.chunks,
            "transcript": record.transcript,
            "report": record.report,
        }),
        PipelineOutcome::Duplicate { recording_id, original_timestamp } => json!({
            "success": true,
            "isDuplicate": true,
            "message": "Duplicate request detected; returning the original recording",
            "recordingId": recording_id,
            "originalTimestamp": original_timestamp.to_rfc3339(),
        }),
    }))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart field: {e}")))
}

async fn read_u32(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<u32> {
    let text = read_text(field).await?;
    text.trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("{name} must be a non-negative integer")))
}
