//! fdk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects the
//! store, wires middleware, and starts the HTTP server. All route handlers
//! live in `routes.rs`; shared state lives in `state.rs`.

use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use fdk_daemon::{routes, state::AppState};
use fdk_notify::{FcmNotifier, NoopNotifier, Notifier};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = fdk_config::Settings::from_env()?;
    let pool = fdk_db::connect(settings.require_database_url()?).await?;
    fdk_db::migrate(&pool).await?;
    let store = Arc::new(fdk_db::PgStore::new(pool));

    let notifier: Arc<dyn Notifier> = match &settings.fcm_server_key {
        Some(key) => Arc::new(FcmNotifier::new(key.clone(), settings.fcm_endpoint.clone())),
        None => {
            info!("no FCM server key configured; notifications disabled");
            Arc::new(NoopNotifier)
        }
    };

    let shared = Arc::new(AppState::new(store, notifier, settings.quota_shares));

    let app = routes::build_router(shared)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = settings.daemon_addr;
    info!("fdk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// CORS: allow only localhost origins (the dispatcher console dev server).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
