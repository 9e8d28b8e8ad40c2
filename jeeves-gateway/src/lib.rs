//! Jeeves gateway - HTTP front door for the study orchestration service
//!
//! Accepts `POST /jeeves` requests carrying a mode and its parameters, admits
//! them against a per-identity quota, and hands them to
//! [`jeeves_agent::JeevesService`].
//!
//! ## Pieces
//!
//! - **Auth**: caller identity from a bearer token, or client IP
//! - **Rate limiting**: fixed-window quotas over an in-memory or MongoDB store
//! - **Routes**: orchestration, health and readiness

pub mod auth;
pub mod config;
pub mod db;
pub mod ratelimit;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{GatewayError, Result};
