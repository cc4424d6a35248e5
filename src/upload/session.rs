//! Upload session state
//!
//! One [`UploadSession`] per logical multi-part upload. Created exactly when
//! chunk index 1 arrives for a previously unknown session id; consumed by a
//! successful finalize or reclaimed by the expiry reaper.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::Mutex;

/// One received chunk: an exclusively owned temp file on disk
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_index: u32,
    pub storage_path: PathBuf,
    pub size_bytes: u64,
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting chunk writes
    Receiving,
    /// A finalize holds the session; chunk writes and a second finalize are rejected
    Finalizing,
    /// Reclaimed by the expiry reaper; its files are gone and every further
    /// operation sees the session as unknown
    Expired,
}

/// In-memory state of one chunked upload
#[derive(Debug)]
pub struct UploadSession {
    pub session_id: String,
    /// Fixed by chunk #1, immutable afterwards
    pub total_chunks: u32,
    /// Chunk index → record; ascending iteration order. A re-upload of an
    /// index replaces the prior record.
    pub received: BTreeMap<u32, ChunkRecord>,
    pub original_filename: String,
    pub mime_type: String,
    pub state: SessionState,
}

impl UploadSession {
    pub fn new(
        session_id: String,
        total_chunks: u32,
        original_filename: String,
        mime_type: String,
    ) -> Self {
        Self {
            session_id,
            total_chunks,
            received: BTreeMap::new(),
            original_filename,
            mime_type,
            state: SessionState::Receiving,
        }
    }

    /// A session is complete iff every index in 1..=total_chunks is present
    pub fn is_complete(&self) -> bool {
        self.received.len() == self.total_chunks as usize
    }

    /// Sorted list of indices still missing
    pub fn missing_chunks(&self) -> Vec<u32> {
        (1..=self.total_chunks)
            .filter(|i| !self.received.contains_key(i))
            .collect()
    }

    /// Chunks still outstanding
    pub fn remaining(&self) -> u32 {
        self.total_chunks.saturating_sub(self.received.len() as u32)
    }
}

/// Map slot wrapping a session behind its per-session exclusive lock.
///
/// `created_at` lives outside the lock so the reaper can age-check sessions
/// without contending with in-flight chunk writes. It is never refreshed by
/// later chunk arrivals, so a very slow upload can expire mid-transfer.
#[derive(Debug)]
pub struct SessionSlot {
    pub created_at: Instant,
    pub session: Mutex<UploadSession>,
}

impl SessionSlot {
    pub fn new(session: UploadSession) -> Self {
        Self {
            created_at: Instant::now(),
            session: Mutex::new(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chunks_is_sorted_gap_list() {
        let mut session =
            UploadSession::new("s".into(), 5, "a.m4a".into(), "audio/mp4".into());
        for i in [4u32, 1] {
            session.received.insert(
                i,
                ChunkRecord {
                    chunk_index: i,
                    storage_path: PathBuf::from(format!("/tmp/chunk_{i}")),
                    size_bytes: 1,
                },
            );
        }

        assert!(!session.is_complete());
        assert_eq!(session.missing_chunks(), vec![2, 3, 5]);
        assert_eq!(session.remaining(), 3);
    }

    #[test]
    fn complete_when_all_indices_present() {
        let mut session =
            UploadSession::new("s".into(), 2, "a.m4a".into(), "audio/mp4".into());
        for i in 1..=2u32 {
            session.received.insert(
                i,
                ChunkRecord {
                    chunk_index: i,
                    storage_path: PathBuf::from(format!("/tmp/chunk_{i}")),
                    size_bytes: 1,
                },
            );
        }

        assert!(session.is_complete());
        assert!(session.missing_chunks().is_empty());
        assert_eq!(session.remaining(), 0);
    }
}
