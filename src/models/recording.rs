//! Recording record model
//!
//! The durable artifact of a completed pipeline run. Created once per
//! successful run and never mutated afterwards; deleted individually by id or
//! in bulk by the administrative delete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable recording row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRecord {
    /// Record id (uuid v4, hex string)
    pub id: String,
    /// Generated storage filename (uuid + original extension)
    pub filename: String,
    /// Blob-store path, e.g. `audio/<filename>`
    pub path: String,
    /// Durable URL returned by the blob store
    pub storage_url: String,
    /// Artifact size in bytes
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
    /// Transcript text; absent when AI processing was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    /// Generated report text; absent when AI processing was skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Owning user, if the client supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub metadata: RecordingMetadata,
}

/// Free-form upload provenance carried alongside the record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub original_filename: String,
    pub mime_type: String,
    /// True when the artifact was reassembled from a chunked upload
    #[serde(default)]
    pub from_chunks: bool,
    /// Origin chunk count for chunked uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<u32>,
}
