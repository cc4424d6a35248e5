//! Error types for medscribe
//!
//! Client-input errors map to 4xx responses with a structured body so the
//! client can resume correctly (e.g. the sorted missing chunk list on an
//! incomplete finalize). Infrastructure errors map to 5xx; none of them
//! leaves a partially persisted recording behind.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Upload session unknown, already consumed, or expired (404)
    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    /// Chunk index outside [1, totalChunks] for the owning session (400)
    #[error("Invalid chunk index {chunk_index}. Expected: 1-{total_chunks}")]
    InvalidChunkIndex { chunk_index: u32, total_chunks: u32 },

    /// Required multipart metadata fields absent (400)
    #[error("Missing required metadata: {0}")]
    MissingMetadata(String),

    /// Finalize attempted before all chunks arrived (400)
    #[error("Cannot finalize. Received {received}/{total} chunks")]
    IncompleteUpload {
        received: usize,
        total: u32,
        /// Sorted list of chunk indices still missing
        missing: Vec<u32>,
    },

    /// Chunk or file payload exceeds the configured cap (413)
    #[error("Payload too large: {size} bytes (limit {limit})")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// A finalize for this session is already in flight (409)
    #[error("Finalize already in progress for session: {0}")]
    FinalizeInProgress(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Chunk merge aborted on a per-chunk read/write failure (500)
    #[error("Reassembly failed at chunk {chunk_index}: {message}")]
    ReassemblyFailed { chunk_index: u32, message: String },

    /// Blob-store upload failed; nothing was persisted (502)
    #[error("Storage upload failed: {0}")]
    StorageUpload(String),

    /// Transcription collaborator failed; nothing was persisted (502)
    #[error("Transcription failed: {0}")]
    Transcription(String),

    /// Report generation collaborator failed; nothing was persisted (502)
    #[error("Report generation failed: {0}")]
    ReportGeneration(String),

    /// Database operation error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (500)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            ApiError::InvalidChunkIndex { .. } => (StatusCode::BAD_REQUEST, "INVALID_CHUNK_INDEX"),
            ApiError::MissingMetadata(_) => (StatusCode::BAD_REQUEST, "MISSING_METADATA"),
            ApiError::IncompleteUpload { .. } => (StatusCode::BAD_REQUEST, "INCOMPLETE_UPLOAD"),
            ApiError::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE")
            }
            ApiError::FinalizeInProgress(_) => (StatusCode::CONFLICT, "FINALIZE_IN_PROGRESS"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::ReassemblyFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "REASSEMBLY_FAILED")
            }
            ApiError::StorageUpload(_) => (StatusCode::BAD_GATEWAY, "STORAGE_UPLOAD_FAILED"),
            ApiError::Transcription(_) => (StatusCode::BAD_GATEWAY, "TRANSCRIPTION_FAILED"),
            ApiError::ReportGeneration(_) => {
                (StatusCode::BAD_GATEWAY, "REPORT_GENERATION_FAILED")
            }
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let mut error = json!({
            "code": error_code,
            "message": self.to_string(),
        });

        // Attach resume information for the client where it exists
        if let ApiError::IncompleteUpload { missing, .. } = &self {
            error["missingChunks"] = json!(missing);
        }
        if let ApiError::ReassemblyFailed { chunk_index, .. } = &self {
            error["chunkIndex"] = json!(chunk_index);
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
