//! MongoDB-backed rate-limit store
//!
//! Shared across gateway replicas. Each admission is an optimistic
//! compare-and-set: read the document, evaluate, then write back filtered on
//! the `(window_start, request_count)` that was read. A lost race re-reads
//! and tries again. The unique `(identity, capability)` index turns two
//! concurrent first requests into one insert and one retry.

use async_trait::async_trait;
use bson::{doc, DateTime as BsonDateTime};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::store::{evaluate, RateLimitStore, StoreError};
use super::{Decision, RateLimitConfig};
use crate::db::schemas::{RateLimitDoc, RATE_LIMIT_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::types::GatewayError;

/// Attempts per admission before giving up
pub const MAX_CAS_ATTEMPTS: u32 = 5;

pub struct MongoRateLimitStore {
    collection: MongoCollection<RateLimitDoc>,
}

impl MongoRateLimitStore {
    /// Open the collection and ensure its indexes
    pub async fn new(mongo: &MongoClient) -> Result<Self, GatewayError> {
        let collection = mongo.collection::<RateLimitDoc>(RATE_LIMIT_COLLECTION).await?;
        Ok(Self { collection })
    }
}

impl From<GatewayError> for StoreError {
    fn from(e: GatewayError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl RateLimitStore for MongoRateLimitStore {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    async fn apply(
        &self,
        identity: &str,
        capability: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<Decision, StoreError> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self
                .collection
                .find_one(RateLimitDoc::key_filter(identity, capability))
                .await?;

            let record = current.as_ref().map(RateLimitDoc::to_record);
            let (next, decision) = evaluate(record.as_ref(), identity, capability, now, config);

            let Some(next) = next else {
                return Ok(decision);
            };

            let written = match current {
                None => match self.collection.insert_one(RateLimitDoc::from_record(&next)).await {
                    Ok(_) => true,
                    Err(GatewayError::DuplicateKey(_)) => false,
                    Err(e) => return Err(e.into()),
                },
                Some(seen) => {
                    let mut filter = RateLimitDoc::key_filter(identity, capability);
                    filter.insert("window_start", seen.window_start);
                    filter.insert("request_count", seen.request_count as i64);

                    let update = doc! {
                        "$set": {
                            "window_start": BsonDateTime::from_chrono(next.window_start),
                            "request_count": next.request_count as i64,
                            "metadata.updated_at": BsonDateTime::now(),
                        }
                    };

                    self.collection.update_one(filter, update).await?.matched_count == 1
                }
            };

            if written {
                return Ok(decision);
            }

            debug!(
                identity = %identity,
                capability = %capability,
                attempt,
                "Rate limit record changed underneath us, retrying"
            );
        }

        Err(StoreError::Contention {
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}
