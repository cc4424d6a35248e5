//! Chunk reassembly
//!
//! Concatenates a complete session's chunk files, in strictly ascending index
//! order, into one new artifact file. Any per-chunk read failure aborts the
//! whole merge; partial output is removed and never handed downstream.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::ApiError;
use crate::upload::session::UploadSession;
use crate::upload::TempFileGuard;

/// Merge every chunk of `session` into a fresh artifact under `tmp_dir`.
/// Returns the artifact path and its byte length. The caller owns the file.
///
/// Precondition: the session is complete, so `received` holds exactly the
/// indices 1..=total_chunks and its BTreeMap iteration order is the merge
/// order.
pub async fn merge_chunks(
    session: &UploadSession,
    tmp_dir: &Path,
) -> Result<(PathBuf, u64), ApiError> {
    tokio::fs::create_dir_all(tmp_dir).await?;
    let artifact_path = tmp_dir.join(format!("merge-{}.tmp", Uuid::new_v4()));
    let guard = TempFileGuard::new(artifact_path.clone());

    let mut artifact = tokio::fs::File::create(&artifact_path).await?;
    let mut total_bytes: u64 = 0;

    for chunk in session.received.values() {
        let mut reader = tokio::fs::File::open(&chunk.storage_path)
            .await
            .map_err(|e| reassembly_error(chunk.chunk_index, &e))?;

        let copied = tokio::io::copy(&mut reader, &mut artifact)
            .await
            .map_err(|e| reassembly_error(chunk.chunk_index, &e))?;
        total_bytes += copied;

        tracing::debug!(
            session_id = %session.session_id,
            chunk_index = chunk.chunk_index,
            bytes = copied,
            "Appended chunk to artifact"
        );
    }

    artifact.flush().await?;
    artifact.sync_all().await?;
    guard.disarm();

    tracing::info!(
        session_id = %session.session_id,
        chunks = session.received.len(),
        total_bytes,
        artifact = %artifact_path.display(),
        "Merged chunks into artifact"
    );

    Ok((artifact_path, total_bytes))
}

fn reassembly_error(chunk_index: u32, source: &std::io::Error) -> ApiError {
    ApiError::ReassemblyFailed {
        chunk_index,
        message: source.to_string(),
    }
}
