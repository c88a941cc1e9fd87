//! Chronicle Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chronicle_common::logging::{init_logging, LogConfig};
use tokio::signal;
use tracing::{info, warn};

use chronicle_server::{
    api::{self, AppState},
    audit::{
        ActivityLogRecorder, AuditSink, AuditedCollection, MemoryAuditSink, PgAuditSink,
        SnapshotCache,
    },
    config::Config,
    db,
    features::{auth::TokenService, users::USERS_COLLECTION, FeatureState},
    store::{DocumentStore, MemoryStore, PgStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::from_env()
        .unwrap_or_default()
        .with_filter_directives("chronicle_server=debug,tower_http=debug,sqlx=info");
    init_logging(&log_config)?;

    info!("Starting Chronicle server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Pick the storage backend: Postgres when configured, in-memory otherwise.
    let (store, sink, backend): (Arc<dyn DocumentStore>, Arc<dyn AuditSink>, &'static str) =
        if config.database.url.is_some() {
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            (
                Arc::new(PgStore::new(pool.clone())),
                Arc::new(PgAuditSink::new(pool)),
                "postgres",
            )
        } else {
            warn!("DATABASE_URL not set - documents and activity logs are in-memory only");
            (
                Arc::new(MemoryStore::new()),
                Arc::new(MemoryAuditSink::new()),
                "memory",
            )
        };

    let recorder = Arc::new(ActivityLogRecorder::new(sink.clone()));
    let snapshots = Arc::new(SnapshotCache::default());
    let users = AuditedCollection::new(USERS_COLLECTION, store, recorder, snapshots);

    let tokens = TokenService::new(
        &config.auth.access_token_secret,
        &config.auth.refresh_token_secret,
    );

    let state = AppState {
        features: FeatureState {
            users,
            audit: sink,
            tokens,
        },
        backend,
    };

    let app = api::app(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight requests and detached audit tasks a moment to finish.
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
