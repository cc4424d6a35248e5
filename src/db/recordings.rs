//! Recording record persistence
//!
//! Insert-once rows; listing is newest-first and capped. Bulk delete
//! optionally filters by owning user.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{RecordingMetadata, RecordingRecord};

/// Hard cap on listing results
pub const LIST_LIMIT: i64 = 100;

type RecordingRow = (
    String,         // guid
    String,         // filename
    String,         // path
    String,         // storage_url
    i64,            // size_bytes
    String,         // uploaded_at (RFC 3339)
    Option<String>, // transcript
    Option<String>, // report
    Option<String>, // user_id
    String,         // metadata JSON
);

fn row_to_record(row: RecordingRow) -> Result<RecordingRecord, sqlx::Error> {
    let (guid, filename, path, storage_url, size_bytes, uploaded_at, transcript, report, user_id, metadata) =
        row;

    let uploaded_at = DateTime::parse_from_rfc3339(&uploaded_at)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc);
    let metadata: RecordingMetadata =
        serde_json::from_str(&metadata).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(RecordingRecord {
        id: guid,
        filename,
        path,
        storage_url,
        size_bytes: size_bytes.max(0) as u64,
        uploaded_at,
        transcript,
        report,
        user_id,
        metadata,
    })
}

/// Insert a recording record
pub async fn insert_recording(db: &SqlitePool, record: &RecordingRecord) -> Result<(), sqlx::Error> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    sqlx::query(
        r#"
        INSERT INTO recordings
            (guid, filename, path, storage_url, size_bytes, uploaded_at,
             transcript, report, user_id, metadata)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.id)
    .bind(&record.filename)
    .bind(&record.path)
    .bind(&record.storage_url)
    .bind(record.size_bytes as i64)
    .bind(record.uploaded_at.to_rfc3339())
    .bind(&record.transcript)
    .bind(&record.report)
    .bind(&record.user_id)
    .bind(metadata)
    .execute(db)
    .await?;

    tracing::debug!(recording_id = %record.id, "Recording persisted");

    Ok(())
}

/// List recordings, newest first, optionally filtered by user, capped at [`LIST_LIMIT`]
pub async fn list_recordings(
    db: &SqlitePool,
    user_id: Option<&str>,
) -> Result<Vec<RecordingRecord>, sqlx::Error> {
    let rows: Vec<RecordingRow> = match user_id {
        Some(user) => {
            sqlx::query_as(
                r#"
                SELECT guid, filename, path, storage_url, size_bytes, uploaded_at,
                       transcript, report, user_id, metadata
                FROM recordings
                WHERE user_id = ?
                ORDER BY uploaded_at DESC
                LIMIT ?
                "#,
            )
            .bind(user)
            .bind(LIST_LIMIT)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"
                SELECT guid, filename, path, storage_url, size_bytes, uploaded_at,
                       transcript, report, user_id, metadata
                FROM recordings
                ORDER BY uploaded_at DESC
                LIMIT ?
                "#,
            )
            .bind(LIST_LIMIT)
            .fetch_all(db)
            .await?
        }
    };

    rows.into_iter().map(row_to_record).collect()
}

/// Fetch one recording by id
pub async fn get_recording(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<RecordingRecord>, sqlx::Error> {
    let row: Option<RecordingRow> = sqlx::query_as(
        r#"
        SELECT guid, filename, path, storage_url, size_bytes, uploaded_at,
               transcript, report, user_id, metadata
        FROM recordings
        WHERE guid = ?
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;

    row.map(row_to_record).transpose()
}

/// Delete one recording by id; returns whether a row was removed
pub async fn delete_recording(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM recordings WHERE guid = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete all recordings, optionally filtered by user; returns removed count
pub async fn delete_all_recordings(
    db: &SqlitePool,
    user_id: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = match user_id {
        Some(user) => {
            sqlx::query("DELETE FROM recordings WHERE user_id = ?")
                .bind(user)
                .execute(db)
                .await?
        }
        None => sqlx::query("DELETE FROM recordings").execute(db).await?,
    };

    Ok(result.rows_affected())
}
