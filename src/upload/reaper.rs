//! Expiry reaper
//!
//! Background task that runs on a fixed period, independent of request
//! traffic, and reclaims abandoned upload sessions and stale dedup entries.
//! Bounds memory and disk usage under client abandonment: a client that
//! starts an upload and disappears cannot leak state indefinitely.

use std::time::Duration;
use tokio::task::JoinHandle;

use crate::dedup::DeduplicationCache;
use crate::upload::store::UploadSessionStore;

/// Sweep policy: how often to run and what counts as stale
#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub period: Duration,
    pub session_ttl: Duration,
    pub dedup_window: Duration,
}

/// Spawn the periodic sweep task. Runs until the process exits.
pub fn spawn(
    store: UploadSessionStore,
    dedup: DeduplicationCache,
    config: ReaperConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(config.period);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep before it has served anything.
        interval.tick().await;

        loop {
            interval.tick().await;
            let sessions = store.sweep_expired(config.session_ttl).await;
            let entries = dedup.sweep_expired(config.dedup_window);
            if sessions > 0 || entries > 0 {
                tracing::info!(
                    expired_sessions = sessions,
                    expired_dedup_entries = entries,
                    "Expiry sweep reclaimed state"
                );
            } else {
                tracing::debug!("Expiry sweep found nothing to reclaim");
            }
        }
    })
}
