//! Chunked upload ingestion
//!
//! Accepts numbered parts of a large audio file over independent HTTP
//! requests, tracks them in an in-memory session store, and reassembles them
//! into one byte-exact artifact on finalize. Session state is process-local
//! by design: a restart drops in-flight uploads and the client restarts them.

pub mod reaper;
pub mod reassembly;
pub mod session;
pub mod store;

pub use session::{ChunkRecord, SessionState, UploadSession};
pub use store::{ChunkAck, ChunkUpload, FinalizedUpload, UploadSessionStore};

use std::path::PathBuf;

/// Removes a partially written file when the owning operation is dropped
/// before completing (caller disconnect, write error). Disarm on success.
pub(crate) struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    /// The file reached its intended state; keep it.
    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove partial temp file");
                }
            }
        }
    }
}
