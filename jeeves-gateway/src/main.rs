//! Jeeves gateway binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jeeves_agent::backend::OpenAiBackend;
use jeeves_agent::{JeevesService, ModeRegistry, TurnProtocol};
use jeeves_gateway::{
    config::{Args, LogFormat},
    db::MongoClient,
    ratelimit::{MemoryStore, MongoRateLimitStore, RateLimitStore, RateLimiter},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("jeeves_gateway={0},jeeves_agent={0},info", log_level).into()
    });
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Jeeves - study orchestration gateway");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("LLM: {} ({})", args.llm_model, args.llm_base_url);
    info!(
        "Rate limit: {} requests / {}s (anonymous {})",
        args.rate_limit_max,
        args.rate_limit_window_secs,
        if args.limit_anonymous { "limited by IP" } else { "unlimited" }
    );
    info!("Trusted proxies: {}", args.trusted_proxies.len());
    info!("Taxonomy: {}", palace::TAXONOMY_VERSION);
    info!("======================================");

    if args.llm_api_key.is_none() {
        warn!("LLM_API_KEY not set - upstream calls will be unauthenticated");
    }

    let backend = OpenAiBackend::with_timeout(
        &args.llm_base_url,
        &args.llm_model,
        args.llm_api_key.clone(),
        args.llm_timeout(),
    )?;

    let store = rate_limit_store(&args).await;
    let limiter = RateLimiter::new(args.rate_limit_config(), store);

    let registry = ModeRegistry::with_defaults(TurnProtocol::new(args.min_commentary_chars));
    let service = JeevesService::new(Arc::new(backend), registry);

    let state = Arc::new(AppState::new(args, service, limiter));
    server::run(state).await?;

    Ok(())
}

/// MongoDB when configured and reachable, otherwise in-process
async fn rate_limit_store(args: &Args) -> Arc<dyn RateLimitStore> {
    let Some(uri) = args.mongodb_uri.as_deref() else {
        info!("Rate limit store: memory (MONGODB_URI not set)");
        return Arc::new(MemoryStore::new());
    };

    let store = match MongoClient::new(uri, &args.mongodb_db).await {
        Ok(mongo) => MongoRateLimitStore::new(&mongo).await,
        Err(e) => Err(e),
    };

    match store {
        Ok(store) => {
            info!("Rate limit store: mongodb");
            Arc::new(store)
        }
        Err(e) => {
            warn!("MongoDB unavailable, rate limiting in memory: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}
