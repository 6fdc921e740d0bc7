//! fdk-worker entry point: connect, spawn the timeout scan loop, run until
//! ctrl-c.

use std::sync::Arc;

use fdk_notify::{FcmNotifier, NoopNotifier, Notifier};
use fdk_worker::{TimeoutWorker, WorkerConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev convenience; silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

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

    let config = WorkerConfig {
        response_timeout: settings.response_timeout(),
        tick: settings.worker_tick(),
    };
    info!(
        timeout_mins = settings.response_timeout_minutes,
        tick_secs = settings.worker_tick_secs,
        "fdk-worker starting"
    );

    let handle = TimeoutWorker::new(store, notifier, config).spawn();

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    handle.stop().await;

    Ok(())
}
