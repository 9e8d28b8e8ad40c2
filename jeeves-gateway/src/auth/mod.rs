//! Authentication for the gateway
//!
//! Provides:
//! - JWT token validation
//! - Caller identity resolution (token subject or client IP)

pub mod identity;
pub mod jwt;

pub use identity::{client_ip, resolve_identity, Identity, FORWARDED_FOR};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenValidationResult};
