//! HTTP server implementation
//!
//! hyper http1 with TokioIo; one task per connection.

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::CONTENT_LENGTH;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use jeeves_agent::JeevesService;

use crate::auth::{resolve_identity, JwtValidator};
use crate::config::Args;
use crate::ratelimit::RateLimiter;
use crate::routes;
use crate::types::GatewayError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Mode registry plus LLM backend
    pub service: JeevesService,
    /// Quota gate for the orchestration endpoint
    pub limiter: RateLimiter,
    /// Bearer token verifier; `None` treats every caller as anonymous
    pub jwt: Option<JwtValidator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(args: Args, service: JeevesService, limiter: RateLimiter) -> Self {
        let jwt = args.jwt_secret.as_deref().map(JwtValidator::new);
        Self {
            args,
            service,
            limiter,
            jwt,
            started_at: Instant::now(),
        }
    }
}

/// Accept connections until the process exits
pub async fn run(state: Arc<AppState>) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Jeeves gateway listening on {}", state.args.listen);
    info!("Modes: {}", state.service.modes().join(", "));

    if state.jwt.is_none() {
        warn!("No JWT secret configured - every caller is anonymous");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!(method = %method, path = %path, addr = %addr, "Request");

    let response = match (method, path.as_str()) {
        (Method::OPTIONS, _) => preflight_response(),

        (Method::GET, "/health" | "/healthz") => routes::health_check(&state),

        (Method::GET, "/ready" | "/readyz") => routes::readiness_check(&state).await,

        (Method::GET, "/version") => routes::version_info(&state),

        (Method::POST, "/jeeves" | "/") => {
            let identity = resolve_identity(
                req.headers(),
                addr,
                state.jwt.as_ref(),
                &state.args.trusted_proxies,
            );
            match read_body(req, state.args.max_body_bytes).await {
                Ok(body) => routes::handle_jeeves(&state, &identity, &body).await,
                Err(response) => response,
            }
        }

        _ => not_found_response(&path),
    };

    debug!(status = %response.status(), path = %path, "Response");
    Ok(to_boxed(response))
}

/// Read the whole body, refusing anything over `max_bytes`
async fn read_body(req: Request<Incoming>, max_bytes: usize) -> Result<Bytes, Response<Full<Bytes>>> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());

    if declared.is_some_and(|len| len > max_bytes) {
        return Err(payload_too_large_response(max_bytes));
    }

    match Limited::new(req.into_body(), max_bytes).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<http_body_util::LengthLimitError>().is_some() => {
            Err(payload_too_large_response(max_bytes))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err(routes::error_response(
                StatusCode::BAD_REQUEST,
                "Failed to read request body",
            ))
        }
    }
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .header("Access-Control-Max-Age", "86400")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({
            "error": "Not Found",
            "path": path,
            "hint": "POST a {\"mode\", \"params\"} body to /jeeves"
        }),
    )
}

fn payload_too_large_response(max_bytes: usize) -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        &serde_json::json!({
            "error": format!("Request body exceeds {} bytes", max_bytes),
        }),
    )
}
