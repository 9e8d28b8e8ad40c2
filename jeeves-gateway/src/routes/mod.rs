//! HTTP routes for the Jeeves gateway

pub mod health;
pub mod jeeves;

pub use health::{health_check, readiness_check, version_info};
pub use jeeves::{handle_jeeves, CAPABILITY};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// JSON response with permissive CORS
///
/// Quota headers are exposed so browser clients can read them.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json_body = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Expose-Headers",
            "Retry-After, X-RateLimit-Limit, X-RateLimit-Remaining",
        )
        .header("Cache-Control", "no-store")
        .body(Full::new(Bytes::from(json_body)))
        .unwrap()
}

/// `{error}` body with the given status
pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &serde_json::json!({ "error": message }))
}
