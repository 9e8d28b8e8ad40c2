//! Configuration for the Jeeves gateway
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::ratelimit::RateLimitConfig;

/// Jeeves - LLM orchestration gateway for Bible study protocols
#[derive(Parser, Debug, Clone)]
#[command(name = "jeeves-gateway")]
#[command(about = "HTTP gateway for the Jeeves study orchestration service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8787")]
    pub listen: SocketAddr,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "LLM_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub llm_base_url: String,

    /// Model name sent upstream
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// API key for the upstream model service
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    pub llm_api_key: Option<String>,

    /// Upstream request timeout in milliseconds
    #[arg(long, env = "LLM_TIMEOUT_MS", default_value = "60000")]
    pub llm_timeout_ms: u64,

    /// HS256 secret for verifying caller bearer tokens (optional)
    /// Without it every caller is treated as anonymous
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Rate-limit window length in seconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value = "3600")]
    pub rate_limit_window_secs: u64,

    /// Requests allowed per identity per capability in one window
    #[arg(long, env = "RATE_LIMIT_MAX", default_value = "100")]
    pub rate_limit_max: u32,

    /// Apply the quota to anonymous callers, keyed by client IP
    #[arg(long, env = "LIMIT_ANONYMOUS", default_value = "true", action = clap::ArgAction::Set)]
    pub limit_anonymous: bool,

    /// Proxy addresses whose X-Forwarded-For is honoured (comma-separated)
    /// Empty means the socket peer is always the client
    #[arg(long, env = "TRUSTED_PROXIES", value_delimiter = ',')]
    pub trusted_proxies: Vec<IpAddr>,

    /// MongoDB connection URI (optional; in-memory rate limiting when unset)
    #[arg(long, env = "MONGODB_URI")]
    pub mongodb_uri: Option<String>,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "jeeves")]
    pub mongodb_db: String,

    /// Minimum chain-game commentary length in characters
    #[arg(long, env = "MIN_COMMENTARY_CHARS", default_value = "120")]
    pub min_commentary_chars: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    /// Quota configuration derived from the CLI
    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.rate_limit_window_secs),
            max_requests: self.rate_limit_max,
            limit_anonymous: self.limit_anonymous,
        }
    }

    /// Upstream request timeout
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_millis(self.llm_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_window_secs == 0 {
            return Err("RATE_LIMIT_WINDOW_SECS must be greater than zero".to_string());
        }

        if self.rate_limit_max == 0 {
            return Err("RATE_LIMIT_MAX must be greater than zero".to_string());
        }

        if self.llm_model.trim().is_empty() {
            return Err("LLM_MODEL must not be empty".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if matches!(self.jwt_secret.as_deref(), Some(s) if s.is_empty()) {
            return Err("JWT_SECRET must not be empty when set".to_string());
        }

        Ok(())
    }
}
