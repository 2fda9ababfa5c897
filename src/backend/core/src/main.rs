//! CoursePulse Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use coursepulse_core::{
    api::{self, AppState},
    cache::Cache,
    config::{BackendKind, Config},
    db::{Database, PgLearningStore},
    events::EventBus,
    invalidation::InvalidationTriggers,
    stats::StatsService,
    telemetry::{self, LoggingConfig, SERVICE_NAME},
};

/// How often the in-memory backend drops expired entries.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("COURSEPULSE_CONFIG") {
        Ok(path) => Config::from_file(&path),
        Err(_) => Config::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    telemetry::init_logging(&LoggingConfig::from(&config.observability))?;
    let metrics = telemetry::install_recorder()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        service = SERVICE_NAME,
        "Starting CoursePulse server"
    );

    let db = Database::connect(&config.database).await?;
    db.check_connectivity().await?;
    tracing::info!("Connected to LMS database");

    let cache = Cache::from_settings(&config.cache).await?;
    let store = Arc::new(PgLearningStore::new(db));
    let stats = StatsService::from_settings(cache.clone(), store, &config.cache);

    let bus = EventBus::new();
    let triggers = Arc::new(InvalidationTriggers::new(&stats));
    let _subscription = triggers.register(&bus);
    tracing::info!(handlers = bus.handler_count(), "Invalidation triggers registered");

    if config.cache.backend == BackendKind::Memory {
        let cache = cache.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                cache.purge_expired().await;
            }
        });
    }

    let app_state = AppState::new(stats, bus, triggers)
        .with_metrics(metrics)
        .with_api_key(config.server.api_key.as_deref());
    let app = api::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
