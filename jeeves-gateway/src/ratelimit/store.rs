//! Rate-limit record storage
//!
//! The window arithmetic lives in [`evaluate`], which is pure. Stores only
//! have to apply it atomically per (identity, capability) key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use super::{Decision, RateLimitConfig};

/// Rate-limit store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Concurrent updates kept conflicting after {attempts} attempts")]
    Contention { attempts: u32 },
}

/// One counter per (identity, capability)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub identity: String,
    pub capability: String,
    pub window_start: DateTime<Utc>,
    pub request_count: u32,
}

impl RateLimitRecord {
    fn opened(identity: &str, capability: &str, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            capability: capability.to_string(),
            window_start: now,
            request_count: 1,
        }
    }
}

/// Apply one admission attempt to the current record.
///
/// Returns the record to write back (`None` when the request is rejected and
/// nothing changes) together with the decision.
pub fn evaluate(
    current: Option<&RateLimitRecord>,
    identity: &str,
    capability: &str,
    now: DateTime<Utc>,
    config: &RateLimitConfig,
) -> (Option<RateLimitRecord>, Decision) {
    let limit = config.max_requests;
    let window_secs = config.window.as_secs() as i64;

    let fresh = || {
        (
            Some(RateLimitRecord::opened(identity, capability, now)),
            Decision::allowed(limit, limit.saturating_sub(1)),
        )
    };

    let Some(record) = current else {
        return fresh();
    };

    // A clock that went backwards counts as zero elapsed.
    let elapsed = (now - record.window_start).num_seconds().max(0);
    if elapsed >= window_secs {
        return fresh();
    }

    if record.request_count >= limit {
        let retry_after = (window_secs - elapsed).max(1) as u64;
        return (None, Decision::rejected(limit, retry_after));
    }

    let mut next = record.clone();
    next.request_count += 1;
    let remaining = limit - next.request_count;
    (Some(next), Decision::allowed(limit, remaining))
}

/// Backing store for rate-limit records
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Short name for health output and logs
    fn name(&self) -> &'static str;

    /// Atomically evaluate and persist one admission for this key
    async fn apply(
        &self,
        identity: &str,
        capability: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<Decision, StoreError>;
}

/// Seconds between sweeps of stale in-memory records
pub const CLEANUP_INTERVAL_SECS: i64 = 300;

/// In-process store
///
/// Counters do not survive a restart and are not shared between replicas.
/// Stale records are swept from `apply` at most every
/// [`CLEANUP_INTERVAL_SECS`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<(String, String), RateLimitRecord>,
    /// Unix seconds of the last sweep
    last_cleanup: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a key, if any
    pub fn get(&self, identity: &str, capability: &str) -> Option<RateLimitRecord> {
        self.records
            .get(&(identity.to_string(), capability.to_string()))
            .map(|r| r.clone())
    }

    /// Drop records whose window closed before `now`
    pub fn cleanup(&self, now: DateTime<Utc>, config: &RateLimitConfig) {
        let window_secs = config.window.as_secs() as i64;
        self.records
            .retain(|_, r| (now - r.window_start).num_seconds() < window_secs);
    }

    /// Sweep if the last sweep is older than the cleanup interval
    fn maybe_cleanup(&self, now: DateTime<Utc>, config: &RateLimitConfig) {
        let now_secs = now.timestamp();
        let last = self.last_cleanup.load(Ordering::Relaxed);

        if now_secs - last < CLEANUP_INTERVAL_SECS {
            return;
        }

        if self
            .last_cleanup
            .compare_exchange(last, now_secs, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
        {
            self.cleanup(now, config);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn apply(
        &self,
        identity: &str,
        capability: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<Decision, StoreError> {
        let key = (identity.to_string(), capability.to_string());

        // The entry guard holds the shard lock for the whole read-modify-write.
        let decision = match self.records.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut slot) => {
                let (next, decision) = evaluate(Some(slot.get()), identity, capability, now, config);
                if let Some(next) = next {
                    slot.insert(next);
                }
                decision
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let (next, decision) = evaluate(None, identity, capability, now, config);
                if let Some(next) = next {
                    slot.insert(next);
                }
                decision
            }
        };

        // The entry guard is gone here; sweeping under it would deadlock its shard.
        self.maybe_cleanup(now, config);

        Ok(decision)
    }
}
