//! Database schemas for the gateway

mod metadata;
mod rate_limit;

pub use metadata::Metadata;
pub use rate_limit::{RateLimitDoc, RATE_LIMIT_COLLECTION};
