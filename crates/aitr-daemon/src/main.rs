//! aitr-daemon entry point.
//!
//! Thin on purpose, mirroring `mqk-daemon::main`: load config/env, build the
//! `Engine`, wire middleware, serve HTTP. All route handlers live in
//! `routes.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use aitr_config::GlobalConfig;
use aitr_daemon::routes;
use aitr_runtime::Engine;
use aitr_signals::SignalSource;
use aitr_store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let config = GlobalConfig::default();
    let store = build_store(&config).await?;

    // PriceFeed is an out-of-scope external collaborator (spec §1/§6): this
    // workspace ships no live market-data adapter, only the deterministic
    // scripted stand-in from `aitr-testkit`, the same placeholder stance
    // `mqk-daemon`'s trading routes take toward broker wiring ("wire real
    // status/control next"). A production deployment swaps this for a real
    // adapter behind the same `PriceFeed` trait.
    let price_feed = Arc::new(aitr_testkit::FakePriceFeed::new());

    let sources: Vec<Arc<dyn SignalSource>> = vec![
        Arc::new(aitr_signals::MlSource),
        Arc::new(aitr_signals::RlSource),
        Arc::new(aitr_signals::SentimentSource),
        Arc::new(aitr_signals::TechnicalSource),
    ];

    let engine = Engine::new(store, config.clone(), price_feed, sources);

    let app = routes::build_router(engine)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr: std::net::SocketAddr = config
        .daemon_addr
        .parse()
        .with_context(|| format!("bad daemon_addr: {}", config.daemon_addr))?;
    info!("aitr-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

/// `AITR_DATABASE_URL` selects Postgres; otherwise an in-process store that
/// doesn't survive a restart, matching `mqk-db`'s env-gated connection
/// pattern but defaulting to something runnable with zero setup.
async fn build_store(config: &GlobalConfig) -> anyhow::Result<Arc<dyn Store>> {
    if let Some(url) = config.database_url.clone().or_else(|| std::env::var(aitr_store::pg::ENV_DATABASE_URL).ok()) {
        let pool = sqlx::PgPool::connect(&url).await.context("connect to postgres")?;
        aitr_store::pg::migrate(&pool).await.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        info!("aitr-daemon: using PgStore");
        Ok(Arc::new(aitr_store::PgStore::new(pool)))
    } else {
        info!("aitr-daemon: no {} set, using InMemoryStore", aitr_store::pg::ENV_DATABASE_URL);
        Ok(Arc::new(aitr_store::InMemoryStore::new()))
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// CORS: allow only localhost origins, matching `mqk-daemon`'s dev-local
/// stance (this daemon has no browser-facing production deployment target
/// per spec §1 "front-end rendering ... out of scope").
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];
    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
