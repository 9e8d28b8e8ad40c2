//! Per-identity, per-capability request quotas
//!
//! Fixed windows: the first admitted request opens a window of
//! `RateLimitConfig::window`, and at most `max_requests` are admitted
//! before it closes. A store failure admits the request.

pub mod mongo;
pub mod store;

pub use mongo::MongoRateLimitStore;
pub use store::{evaluate, MemoryStore, RateLimitRecord, RateLimitStore, StoreError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Quota settings injected at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Window length
    pub window: Duration,
    /// Requests admitted per window
    pub max_requests: u32,
    /// Whether anonymous callers are limited (by client IP)
    pub limit_anonymous: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            max_requests: 100,
            limit_anonymous: true,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
    pub limit: u32,
}

impl Decision {
    pub fn allowed(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
            limit,
        }
    }

    pub fn rejected(limit: u32, retry_after_secs: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs,
            limit,
        }
    }
}

/// Quota gate in front of the orchestration service
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, store: Arc<dyn RateLimitStore>) -> Self {
        Self { config, store }
    }

    /// In-memory limiter
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Admit or reject a request at the current time
    pub async fn admit(&self, identity: &str, capability: &str) -> Decision {
        self.admit_at(identity, capability, Utc::now()).await
    }

    /// Admit or reject a request at `now`
    pub async fn admit_at(&self, identity: &str, capability: &str, now: DateTime<Utc>) -> Decision {
        match self.store.apply(identity, capability, now, &self.config).await {
            Ok(decision) => {
                debug!(
                    identity = %identity,
                    capability = %capability,
                    allowed = decision.allowed,
                    remaining = decision.remaining,
                    "Rate limit checked"
                );
                decision
            }
            Err(e) => {
                warn!(
                    identity = %identity,
                    capability = %capability,
                    store = self.store.name(),
                    error = %e,
                    "Rate limit store failed, admitting request"
                );
                Decision::allowed(self.config.max_requests, self.config.max_requests)
            }
        }
    }
}
