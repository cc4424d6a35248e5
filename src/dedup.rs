//! Request deduplication
//!
//! Maps a request fingerprint to the recording produced by a prior pipeline
//! run, so N retries of the same logical request within the dedup window
//! trigger at most one expensive transcription/report run. The guarantee
//! covers concurrent retries too: [`DeduplicationCache::claim`] installs an
//! in-flight reservation under a single lock acquisition, and later claimants
//! of the same signature wait for the first run's result instead of starting
//! their own. Completed entries are expired lazily at lookup time and
//! additionally swept by the reaper; an expired entry is never returned as a
//! hit.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

/// Opaque request fingerprint (hex-encoded hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a signature from a precomputed value (tests, diagnostics)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Signature(raw.into())
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifying fields of one processing request
#[derive(Debug, Default)]
pub struct FingerprintContext<'a> {
    /// Caller-supplied client id (`x-client-id` header or `clientId` query)
    pub client_id: Option<&'a str>,
    /// Caller-supplied request id (`x-request-id` header or `requestId` query)
    pub request_id: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub payload_size: u64,
}

/// Derive the request signature.
///
/// When the caller supplies both a client id and a request id, those alone
/// identify the logical request. Otherwise fall back to a time-bucketed hash
/// of whatever is available, so near-simultaneous retries of the same request
/// collapse even without explicit ids. The fallback can also collide
/// unrelated same-size anonymous requests inside one bucket; that trade-off
/// is deliberate and kept for compatibility.
pub fn fingerprint(ctx: &FingerprintContext<'_>, bucket: Duration) -> Signature {
    let now_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    fingerprint_at(ctx, bucket, now_secs)
}

fn fingerprint_at(ctx: &FingerprintContext<'_>, bucket: Duration, now_secs: u64) -> Signature {
    if let (Some(client_id), Some(request_id)) = (ctx.client_id, ctx.request_id) {
        tracing::debug!(client_id, request_id, "Using provided ids for request signature");
        return Signature(sha256_hex(&format!("{client_id}-{request_id}")));
    }

    let bucket_secs = bucket.as_secs().max(1);
    let time_window = (now_secs / bucket_secs) * bucket_secs;

    let components = [
        ctx.user_id.unwrap_or("anonymous"),
        &ctx.payload_size.to_string(),
        ctx.client_id.unwrap_or(""),
        ctx.request_id.unwrap_or(""),
        &time_window.to_string(),
    ]
    .join("-");

    let signature = Signature(sha256_hex(&components));
    tracing::debug!(signature = %signature, "Generated fallback request fingerprint");
    signature
}

fn sha256_hex(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

/// A prior pipeline result keyed by signature
#[derive(Debug, Clone)]
pub struct DedupEntry {
    pub recording_id: String,
    /// Expiry clock (monotonic)
    pub recorded_at: Instant,
    /// Wall-clock counterpart reported back to duplicate callers
    pub recorded_at_utc: DateTime<Utc>,
}

enum CacheSlot {
    /// A run for this signature is executing; waiters park on the channel
    InFlight(watch::Receiver<()>),
    Done(DedupEntry),
}

type Entries = Arc<Mutex<HashMap<String, CacheSlot>>>;

/// Outcome of claiming a signature
pub enum DedupClaim {
    /// The caller owns the run; resolve it through the guard
    Run(PendingRun),
    /// A completed run inside the window; nothing to execute
    Duplicate(DedupEntry),
}

/// Reservation held by the one claimant executing the pipeline for a
/// signature. `complete` publishes the result to concurrent waiters;
/// dropping the guard without completing clears the reservation so a retry
/// can execute.
pub struct PendingRun {
    entries: Entries,
    signature: String,
    // Dropped on resolution either way, waking every parked waiter
    _notify: watch::Sender<()>,
    resolved: bool,
}

impl PendingRun {
    /// The run succeeded; record its recording id for later claimants
    pub fn complete(mut self, recording_id: String) {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        entries.insert(
            self.signature.clone(),
            CacheSlot::Done(DedupEntry {
                recording_id,
                recorded_at: Instant::now(),
                recorded_at_utc: Utc::now(),
            }),
        );
        self.resolved = true;
        tracing::debug!(signature = %self.signature, "Recorded dedup entry");
    }
}

impl Drop for PendingRun {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        // Failed run: clear the reservation so the signature is claimable
        // again. Waiters wake and race for a fresh claim.
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        if let Some(CacheSlot::InFlight(_)) = entries.get(&self.signature) {
            entries.remove(&self.signature);
        }
    }
}

/// In-memory deduplication cache with single-flight claims
#[derive(Clone, Default)]
pub struct DeduplicationCache {
    entries: Entries,
}

impl DeduplicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `signature` for execution. Exactly one concurrent claimant gets
    /// [`DedupClaim::Run`]; the rest wait for that run to resolve and then
    /// receive its entry as [`DedupClaim::Duplicate`]. If the owning run
    /// fails, one waiter claims ownership and executes.
    pub async fn claim(&self, signature: &Signature, window: Duration) -> DedupClaim {
        loop {
            let mut waiter = {
                let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
                match entries.get(signature.as_str()) {
                    Some(CacheSlot::Done(entry)) if entry.recorded_at.elapsed() < window => {
                        return DedupClaim::Duplicate(entry.clone());
                    }
                    Some(CacheSlot::InFlight(rx)) => rx.clone(),
                    // Absent or expired: this claimant becomes the owner
                    _ => {
                        let (tx, rx) = watch::channel(());
                        entries.insert(signature.as_str().to_string(), CacheSlot::InFlight(rx));
                        return DedupClaim::Run(PendingRun {
                            entries: self.entries.clone(),
                            signature: signature.as_str().to_string(),
                            _notify: tx,
                            resolved: false,
                        });
                    }
                }
            };

            // Owner resolution drops the sender; the resulting Err wakes us
            // to re-claim and observe the outcome.
            let _ = waiter.changed().await;
            tracing::debug!(signature = %signature, "In-flight run resolved; re-claiming");
        }
    }

    /// Look up a completed entry. Entries older than `window` are logically
    /// absent and are removed on sight; in-flight reservations are not hits.
    pub fn lookup(&self, signature: &Signature, window: Duration) -> Option<DedupEntry> {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        match entries.get(signature.as_str()) {
            Some(CacheSlot::Done(entry)) if entry.recorded_at.elapsed() < window => {
                Some(entry.clone())
            }
            Some(CacheSlot::Done(_)) => {
                entries.remove(signature.as_str());
                tracing::debug!(signature = %signature, "Expired dedup entry dropped at lookup");
                None
            }
            _ => None,
        }
    }

    /// Insert or overwrite the completed entry for `signature`
    pub fn record(&self, signature: &Signature, recording_id: String) {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        entries.insert(
            signature.as_str().to_string(),
            CacheSlot::Done(DedupEntry {
                recording_id,
                recorded_at: Instant::now(),
                recorded_at_utc: Utc::now(),
            }),
        );
        tracing::debug!(signature = %signature, "Recorded dedup entry");
    }

    /// Remove every completed entry older than `window`; in-flight
    /// reservations are left for their owner to resolve. Returns the removed
    /// count.
    pub fn sweep_expired(&self, window: Duration) -> usize {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, slot| match slot {
            CacheSlot::Done(entry) => entry.recorded_at.elapsed() < window,
            CacheSlot::InFlight(_) => true,
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_ids_dominate_the_fingerprint() {
        let with_ids = FingerprintContext {
            client_id: Some("client-7"),
            request_id: Some("req-42"),
            user_id: Some("alice"),
            payload_size: 100,
        };
        let same_ids_other_fields = FingerprintContext {
            client_id: Some("client-7"),
            request_id: Some("req-42"),
            user_id: Some("bob"),
            payload_size: 9999,
        };

        // Different users, sizes, and time buckets: same logical request
        let a = fingerprint_at(&with_ids, Duration::from_secs(5), 1000);
        let b = fingerprint_at(&same_ids_other_fields, Duration::from_secs(5), 2000);
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_collapses_within_a_bucket_and_splits_across_buckets() {
        let ctx = FingerprintContext {
            client_id: None,
            request_id: None,
            user_id: None,
            payload_size: 4096,
        };
        let bucket = Duration::from_secs(5);

        assert_eq!(
            fingerprint_at(&ctx, bucket, 1002),
            fingerprint_at(&ctx, bucket, 1004)
        );
        assert_ne!(
            fingerprint_at(&ctx, bucket, 1004),
            fingerprint_at(&ctx, bucket, 1005)
        );
    }

    #[test]
    fn fallback_distinguishes_payload_sizes() {
        let bucket = Duration::from_secs(5);
        let small = FingerprintContext { payload_size: 100, ..Default::default() };
        let large = FingerprintContext { payload_size: 200, ..Default::default() };
        assert_ne!(
            fingerprint_at(&small, bucket, 1000),
            fingerprint_at(&large, bucket, 1000)
        );
    }

    #[test]
    fn lookup_hits_within_window_and_misses_after() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");

        cache.record(&sig, "rec-9".to_string());

        let hit = cache.lookup(&sig, Duration::from_secs(30)).unwrap();
        assert_eq!(hit.recording_id, "rec-9");

        // Zero window: the entry is logically absent even before any sweep
        assert!(cache.lookup(&sig, Duration::ZERO).is_none());
        // And the lazy expiry physically removed it
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn record_overwrites_prior_entry() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");

        cache.record(&sig, "old".to_string());
        cache.record(&sig, "new".to_string());

        let hit = cache.lookup(&sig, Duration::from_secs(30)).unwrap();
        assert_eq!(hit.recording_id, "new");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let cache = DeduplicationCache::new();
        cache.record(&Signature::from_raw("a"), "r1".to_string());
        cache.record(&Signature::from_raw("b"), "r2".to_string());

        assert_eq!(cache.sweep_expired(Duration::from_secs(3600)), 0);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.sweep_expired(Duration::ZERO), 2);
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn first_claim_runs_and_completion_turns_later_claims_into_duplicates() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");
        let window = Duration::from_secs(30);

        let pending = match cache.claim(&sig, window).await {
            DedupClaim::Run(pending) => pending,
            DedupClaim::Duplicate(_) => panic!("first claim must own the run"),
        };
        pending.complete("rec-1".to_string());

        match cache.claim(&sig, window).await {
            DedupClaim::Duplicate(entry) => assert_eq!(entry.recording_id, "rec-1"),
            DedupClaim::Run(_) => panic!("completed signature must be a duplicate"),
        }
    }

    #[tokio::test]
    async fn concurrent_claim_waits_for_the_owner_and_gets_its_result() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");
        let window = Duration::from_secs(30);

        let pending = match cache.claim(&sig, window).await {
            DedupClaim::Run(pending) => pending,
            DedupClaim::Duplicate(_) => panic!("first claim must own the run"),
        };

        // Second claimant parks until the owner resolves
        let waiter = {
            let cache = cache.clone();
            let sig = sig.clone();
            tokio::spawn(async move { cache.claim(&sig, window).await })
        };
        tokio::task::yield_now().await;

        pending.complete("rec-1".to_string());

        match waiter.await.unwrap() {
            DedupClaim::Duplicate(entry) => assert_eq!(entry.recording_id, "rec-1"),
            DedupClaim::Run(_) => panic!("waiter must see the owner's result"),
        }
    }

    #[tokio::test]
    async fn abandoned_run_lets_a_waiter_take_ownership() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");
        let window = Duration::from_secs(30);

        let pending = match cache.claim(&sig, window).await {
            DedupClaim::Run(pending) => pending,
            DedupClaim::Duplicate(_) => panic!("first claim must own the run"),
        };

        let waiter = {
            let cache = cache.clone();
            let sig = sig.clone();
            tokio::spawn(async move { cache.claim(&sig, window).await })
        };
        tokio::task::yield_now().await;

        // Owner fails without completing; the reservation is cleared
        drop(pending);

        match waiter.await.unwrap() {
            DedupClaim::Run(_) => {}
            DedupClaim::Duplicate(_) => panic!("failed run must not produce a duplicate"),
        }
        // Only the waiter's own (now dropped) reservation ever existed after
        // the failure, and its drop cleared it too
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn sweep_leaves_in_flight_reservations_alone() {
        let cache = DeduplicationCache::new();
        let sig = Signature::from_raw("sig-1");

        let pending = match cache.claim(&sig, Duration::from_secs(30)).await {
            DedupClaim::Run(pending) => pending,
            DedupClaim::Duplicate(_) => panic!("first claim must own the run"),
        };

        assert_eq!(cache.sweep_expired(Duration::ZERO), 0);
        assert_eq!(cache.len(), 1);
        drop(pending);
        assert_eq!(cache.len(), 0);
    }
}
