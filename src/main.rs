//! turnstile-back binary entrypoint wiring REST, SSE, storage and notification layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile_back::{
    build_router,
    config::AppConfig,
    dao::queue_store::{MemoryQueueStore, QueueStore},
    services::{
        notifier::{LogNotifier, Notifier, Outbox},
        sweeper,
    },
    state::{AppState, SharedState, clock::SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let outbox = Arc::new(Outbox::spawn(build_notifier(&config)?, &config));
    let clock = Arc::new(SystemClock);

    let app_state = match env::var("MONGO_URI").ok().filter(|uri| !uri.is_empty()) {
        Some(_) => start_mongo(config.clone(), clock, outbox).await?,
        None => {
            warn!("MONGO_URI not set; queues are kept in memory and lost on restart");
            let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
            AppState::with_store(config.clone(), clock, outbox, store)
        }
    };

    tokio::spawn(sweeper::run(app_state.clone(), config.sweep_interval()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Telegram when `TELEGRAM_BOT_TOKEN` is set, the log otherwise.
#[cfg_attr(not(feature = "telegram"), allow(unused_variables))]
fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match env::var("TELEGRAM_BOT_TOKEN").ok().filter(|token| !token.is_empty()) {
        #[cfg(feature = "telegram")]
        Some(token) => {
            let notifier = turnstile_back::services::notifier::TelegramNotifier::new(
                config.telegram_api_base(),
                &token,
            )
            .context("building Telegram client")?;
            info!("turn notices are delivered through Telegram");
            Ok(Arc::new(notifier))
        }
        #[cfg(not(feature = "telegram"))]
        Some(_) => {
            warn!("TELEGRAM_BOT_TOKEN set but the `telegram` feature is disabled; logging notices");
            Ok(Arc::new(LogNotifier))
        }
        None => {
            info!("TELEGRAM_BOT_TOKEN not set; turn notices are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Start degraded and let the supervisor install the MongoDB store once reachable.
#[cfg(feature = "mongo-store")]
async fn start_mongo(
    config: AppConfig,
    clock: Arc<SystemClock>,
    outbox: Arc<Outbox>,
) -> anyhow::Result<SharedState> {
    use turnstile_back::{
        dao::{
            queue_store::mongodb::{MongoConfig, MongoQueueStore},
            storage::StorageError,
        },
        services::storage_supervisor,
    };

    let mongo_config = MongoConfig::from_env()
        .await
        .context("reading MongoDB settings")?;
    let state = AppState::new(config, clock, outbox);

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let mongo_config = mongo_config.clone();
        async move {
            let store = MongoQueueStore::connect(mongo_config).await?;
            Ok::<Arc<dyn QueueStore>, StorageError>(Arc::new(store))
        }
    }));

    Ok(state)
}

#[cfg(not(feature = "mongo-store"))]
async fn start_mongo(
    _config: AppConfig,
    _clock: Arc<SystemClock>,
    _outbox: Arc<Outbox>,
) -> anyhow::Result<SharedState> {
    anyhow::bail!("MONGO_URI is set but the `mongo-store` feature is disabled")
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
