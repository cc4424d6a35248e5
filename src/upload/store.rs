//! Upload session store
//!
//! Global map of in-flight chunked uploads. The map itself takes a short
//! read/write lock for lookup, insert, and delete; all chunk-map mutation for
//! a given session happens under that session's own mutex, so concurrent
//! chunk deliveries for one session serialize while distinct sessions stay
//! independent. The map guard is never held across an await of a session
//! lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::upload::reassembly;
use crate::upload::session::{ChunkRecord, SessionSlot, SessionState, UploadSession};
use crate::upload::TempFileGuard;

/// One chunk delivery, parsed from the multipart request
#[derive(Debug)]
pub struct ChunkUpload {
    pub session_id: String,
    /// 1-based chunk index
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub filename: String,
    pub mime_type: String,
    pub payload: axum::body::Bytes,
}

/// Acknowledgement returned for a stored chunk. `remaining` is informational
/// only; finalize re-checks completeness atomically.
#[derive(Debug, Clone, Copy)]
pub struct ChunkAck {
    pub total_chunks: u32,
    pub remaining: u32,
}

/// A reassembled upload handed to the ingestion pipeline. The caller owns the
/// artifact file; the session and its chunk temp files are already gone.
#[derive(Debug)]
pub struct FinalizedUpload {
    pub artifact_path: PathBuf,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub chunk_count: u32,
}

/// In-memory store of in-flight chunked uploads
#[derive(Clone)]
pub struct UploadSessionStore {
    chunks_dir: PathBuf,
    tmp_dir: PathBuf,
    sessions: Arc<RwLock<HashMap<String, Arc<SessionSlot>>>>,
}

impl UploadSessionStore {
    /// `chunks_dir` holds per-session chunk spool directories; `tmp_dir`
    /// receives merged artifacts.
    pub fn new(chunks_dir: PathBuf, tmp_dir: PathBuf) -> Self {
        Self {
            chunks_dir,
            tmp_dir,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store one chunk, creating the session if this is chunk 1 of an unknown
    /// session id. Re-upload of an already-received index replaces the prior
    /// payload, so client retries are idempotent.
    pub async fn receive_chunk(&self, upload: ChunkUpload) -> Result<ChunkAck, ApiError> {
        if upload.chunk_index < 1 {
            return Err(ApiError::InvalidChunkIndex {
                chunk_index: upload.chunk_index,
                total_chunks: upload.total_chunks,
            });
        }
        if upload.total_chunks < 1 {
            return Err(ApiError::BadRequest(
                "totalChunks must be a positive integer".to_string(),
            ));
        }

        let slot = self.get_slot(&upload.session_id).await;
        let slot = match slot {
            Some(slot) => slot,
            // A session only comes into existence when chunk 1 arrives
            None if upload.chunk_index == 1 => {
                let mut sessions = self.sessions.write().await;
                sessions
                    .entry(upload.session_id.clone())
                    .or_insert_with(|| {
                        tracing::info!(
                            session_id = %upload.session_id,
                            total_chunks = upload.total_chunks,
                            "Created new upload session"
                        );
                        Arc::new(SessionSlot::new(UploadSession::new(
                            upload.session_id.clone(),
                            upload.total_chunks,
                            upload.filename.clone(),
                            upload.mime_type.clone(),
                        )))
                    })
                    .clone()
            }
            None => return Err(ApiError::SessionNotFound(upload.session_id)),
        };

        let mut session = slot.session.lock().await;

        match session.state {
            SessionState::Finalizing => {
                return Err(ApiError::FinalizeInProgress(upload.session_id));
            }
            // Reaped while we waited for the lock; writing now would orphan
            // a chunk file no sweep revisits.
            SessionState::Expired => {
                return Err(ApiError::SessionNotFound(upload.session_id));
            }
            SessionState::Receiving => {}
        }
        if upload.chunk_index > session.total_chunks {
            return Err(ApiError::InvalidChunkIndex {
                chunk_index: upload.chunk_index,
                total_chunks: session.total_chunks,
            });
        }

        // Persist the payload to the session-scoped spool; the guard removes
        // a partial file if the write is interrupted.
        let session_dir = self.chunks_dir.join(&session.session_id);
        tokio::fs::create_dir_all(&session_dir).await?;
        let chunk_path = session_dir.join(format!("chunk_{:05}.part", upload.chunk_index));
        let guard = TempFileGuard::new(chunk_path.clone());
        let size_bytes = upload.payload.len() as u64;
        tokio::fs::write(&chunk_path, &upload.payload).await?;
        guard.disarm();

        let replaced = session
            .received
            .insert(
                upload.chunk_index,
                ChunkRecord {
                    chunk_index: upload.chunk_index,
                    storage_path: chunk_path,
                    size_bytes,
                },
            )
            .is_some();

        tracing::debug!(
            session_id = %session.session_id,
            chunk_index = upload.chunk_index,
            size_bytes,
            replaced,
            remaining = session.remaining(),
            "Stored chunk"
        );

        Ok(ChunkAck {
            total_chunks: session.total_chunks,
            remaining: session.remaining(),
        })
    }

    /// Read-only session lookup (remaining count, missing list)
    pub async fn session_status(&self, session_id: &str) -> Option<(u32, Vec<u32>)> {
        let slot = self.get_slot(session_id).await?;
        let session = slot.session.lock().await;
        Some((session.total_chunks, session.missing_chunks()))
    }

    /// Reassemble a complete session into one artifact and consume the
    /// session. At most once per session: a concurrent second finalize fails
    /// with `FinalizeInProgress`, a later one with `SessionNotFound`.
    pub async fn finalize(&self, session_id: &str) -> Result<FinalizedUpload, ApiError> {
        let slot = self
            .get_slot(session_id)
            .await
            .ok_or_else(|| ApiError::SessionNotFound(session_id.to_string()))?;

        let mut session = slot.session.lock().await;

        match session.state {
            SessionState::Finalizing => {
                return Err(ApiError::FinalizeInProgress(session_id.to_string()));
            }
            SessionState::Expired => {
                return Err(ApiError::SessionNotFound(session_id.to_string()));
            }
            SessionState::Receiving => {}
        }
        if !session.is_complete() {
            return Err(ApiError::IncompleteUpload {
                received: session.received.len(),
                total: session.total_chunks,
                missing: session.missing_chunks(),
            });
        }

        session.state = SessionState::Finalizing;
        tracing::info!(
            session_id,
            total_chunks = session.total_chunks,
            "Finalizing upload session"
        );

        match reassembly::merge_chunks(&session, &self.tmp_dir).await {
            Ok((artifact_path, size_bytes)) => {
                let finalized = FinalizedUpload {
                    artifact_path,
                    original_filename: session.original_filename.clone(),
                    mime_type: session.mime_type.clone(),
                    size_bytes,
                    chunk_count: session.total_chunks,
                };

                // Session consumed: spool files go, then the map entry.
                self.delete_session_files(&session).await;
                drop(session);
                self.sessions.write().await.remove(session_id);

                tracing::info!(
                    session_id,
                    size_bytes = finalized.size_bytes,
                    "Upload session finalized and removed"
                );
                Ok(finalized)
            }
            Err(e) => {
                // Keep the session so the client can re-upload the bad chunk
                // and retry the finalize.
                session.state = SessionState::Receiving;
                Err(e)
            }
        }
    }

    /// Remove every session older than `ttl`. Chunk temp files are deleted
    /// best-effort; individual delete failures are logged, never fatal.
    /// Returns the number of sessions reclaimed.
    pub async fn sweep_expired(&self, ttl: Duration) -> usize {
        let expired: Vec<(String, Arc<SessionSlot>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(_, slot)| slot.created_at.elapsed() > ttl)
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };

        let mut reclaimed = 0;
        for (session_id, slot) in expired {
            // Mark and delete under the session lock: a receive_chunk that
            // already cloned this slot either wrote its chunk before we got
            // the lock (its file is in `received` and deleted here) or sees
            // Expired afterwards and writes nothing. No orphan files.
            {
                let mut session = slot.session.lock().await;
                match session.state {
                    SessionState::Finalizing => {
                        // The in-flight finalize owns the spool files; leave
                        // the session for it to consume (or a later sweep).
                        tracing::debug!(session_id = %session_id, "Skipping reclaim of finalizing session");
                        continue;
                    }
                    SessionState::Expired => {}
                    SessionState::Receiving => {
                        session.state = SessionState::Expired;
                        tracing::info!(
                            session_id = %session_id,
                            chunks = session.received.len(),
                            "Reclaiming expired upload session"
                        );
                        self.delete_session_files(&session).await;
                        reclaimed += 1;
                    }
                }
            }
            self.sessions.write().await.remove(&session_id);
        }
        reclaimed
    }

    /// Number of in-flight sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn get_slot(&self, session_id: &str) -> Option<Arc<SessionSlot>> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Best-effort removal of a session's chunk files and spool directory
    async fn delete_session_files(&self, session: &UploadSession) {
        for chunk in session.received.values() {
            if let Err(e) = tokio::fs::remove_file(&chunk.storage_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %chunk.storage_path.display(),
                        error = %e,
                        "Failed to delete chunk file"
                    );
                }
            }
        }
        let session_dir = self.chunks_dir.join(&session.session_id);
        if let Err(e) = tokio::fs::remove_dir(&session_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(
                    path = %session_dir.display(),
                    error = %e,
                    "Failed to remove session directory"
                );
            }
        }
    }
}
