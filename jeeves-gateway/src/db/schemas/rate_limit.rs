//! Rate-limit counter document
//!
//! One document per (identity, capability). The counter is only meaningful
//! relative to `window_start`; stale documents are reset in place, never
//! deleted.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::ratelimit::RateLimitRecord;

/// Collection name for rate-limit counters
pub const RATE_LIMIT_COLLECTION: &str = "rate_limits";

/// Rate-limit counter stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RateLimitDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// User id or `anon:<ip>`
    pub identity: String,

    /// Capability the quota applies to
    pub capability: String,

    pub window_start: DateTime,

    pub request_count: u32,
}

impl RateLimitDoc {
    pub fn from_record(record: &RateLimitRecord) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            identity: record.identity.clone(),
            capability: record.capability.clone(),
            window_start: DateTime::from_chrono(record.window_start),
            request_count: record.request_count,
        }
    }

    pub fn to_record(&self) -> RateLimitRecord {
        RateLimitRecord {
            identity: self.identity.clone(),
            capability: self.capability.clone(),
            window_start: self.window_start.to_chrono(),
            request_count: self.request_count,
        }
    }

    /// Filter selecting this key
    pub fn key_filter(identity: &str, capability: &str) -> Document {
        doc! { "identity": identity, "capability": capability }
    }
}

impl IntoIndexes for RateLimitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "identity": 1, "capability": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("identity_capability_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for RateLimitDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
