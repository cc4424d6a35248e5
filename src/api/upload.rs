//! Single-shot upload endpoint
//!
//! `POST /upload-audio` accepts one complete audio file as multipart form
//! data and runs the ingestion pipeline on it directly, no session involved.

use axum::{
    extract::{Multipart, Query, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::request_identity;
use crate::dedup::{fingerprint, FingerprintContext};
use crate::error::{ApiError, ApiResult};
use crate::pipeline::{ArtifactMetadata, PipelineOutcome, ProcessOptions};
use crate::upload::TempFileGuard;
use crate::AppState;

/// Build single-shot upload routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/upload-audio", post(upload_audio))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery {
    #[serde(rename = "skipAI")]
    skip_ai: Option<String>,
    api_key: Option<String>,
    client_id: Option<String>,
    request_id: Option<String>,
}

/// **POST /upload-audio** - Ingest one complete audio file
///
/// Multipart fields: the file as `audio`, plus optional `userId`, `apiKey`,
/// `clientId`, and `requestId` text fields. `skipAI=true` (query or field)
/// stores the file without transcription or report.
async fn upload_audio(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut payload: Option<axum::body::Bytes> = None;
    let mut filename: Option<String> = None;
    let mut mime_type: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut field_api_key: Option<String> = None;
    let mut field_client_id: Option<String> = None;
    let mut field_request_id: Option<String> = None;
    let mut field_skip_ai = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "audio" => {
                filename = field.file_name().map(str::to_string);
                mime_type = field.content_type().map(str::to_string);
                payload = Some(field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("Failed to read audio payload: {e}"))
                })?);
            }
            "userId" => user_id = Some(read_text(field).await?),
            "apiKey" => field_api_key = Some(read_text(field).await?),
            "clientId" => field_client_id = Some(read_text(field).await?),
            "requestId" => field_request_id = Some(read_text(field).await?),
            "skipAI" => field_skip_ai = read_text(field).await? == "true",
            _ => {}
        }
    }

    let payload = payload.ok_or_else(|| ApiError::MissingMetadata("audio".to_string()))?;
    if payload.len() as u64 > state.config.max_chunk_bytes {
        return Err(ApiError::PayloadTooLarge {
            size: payload.len() as u64,
            limit: state.config.max_chunk_bytes,
        });
    }

    let original_filename = filename.unwrap_or_else(|| "recording.m4a".to_string());
    let mime_type = mime_type.unwrap_or_else(|| "audio/mp4".to_string());
    let size_bytes = payload.len() as u64;

    // Spool to disk; the pipeline consumes the file from here.
    tokio::fs::create_dir_all(state.config.tmp_dir()).await?;
    let artifact_path = state
        .config
        .tmp_dir()
        .join(format!("upload-{}.tmp", Uuid::new_v4()));
    let guard = TempFileGuard::new(artifact_path.clone());
    tokio::fs::write(&artifact_path, &payload).await?;
    guard.disarm();

    tracing::info!(
        filename = %original_filename,
        size_bytes,
        "Received single-shot upload"
    );

    let (client_id, request_id) = request_identity(
        &headers,
        query.client_id.as_deref().or(field_client_id.as_deref()),
        query.request_id.as_deref().or(field_request_id.as_deref()),
    );
    let signature = fingerprint(
        &FingerprintContext {
            client_id: client_id.as_deref(),
            request_id: request_id.as_deref(),
            user_id: user_id.as_deref(),
            payload_size: size_bytes,
        },
        state.config.fingerprint_bucket,
    );

    let skip_ai = query.skip_ai.as_deref() == Some("true") || field_skip_ai;
    let pipeline = state.pipeline_for(query.api_key.or(field_api_key));

    let outcome = pipeline
        .process(
            artifact_path,
            ArtifactMetadata {
                original_filename,
                mime_type,
                size_bytes,
                user_id,
                chunk_count: None,
            },
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
