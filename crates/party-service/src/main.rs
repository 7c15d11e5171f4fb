//! Party Service
//!
//! Entry point for the watch-party coordinator.

use common::secret::ExposeSecret;
use party_service::catalog::TmdbClient;
use party_service::config::Config;
use party_service::hub::HubHandle;
use party_service::observability::metrics::init_metrics_recorder;
use party_service::party::PartyCoordinator;
use party_service::routes::{self, AppState};
use party_service::store::RedisStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "party_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Party Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        session_ttl_seconds = config.session_ttl_seconds,
        lock_duration_seconds = config.lock_duration_seconds,
        strict_late_votes = config.strict_late_votes,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    info!("Connecting to Redis...");
    let store = Arc::new(
        RedisStore::connect(config.redis_url.expose_secret(), config.session_ttl())
            .await
            .map_err(|e| {
                error!("Failed to connect to Redis: {}", e);
                e
            })?,
    );
    info!("Redis connection established");

    let catalog = Arc::new(
        TmdbClient::new(
            config.tmdb_base_url.clone(),
            config.tmdb_api_key.clone(),
            config.catalog_timeout(),
        )
        .map_err(|e| {
            error!("Failed to build movie catalog client: {}", e);
            e
        })?,
    );

    let coordinator = Arc::new(PartyCoordinator::new(
        store,
        catalog,
        config.coordinator_settings(),
    ));
    let hub = HubHandle::new();
    let shutdown = CancellationToken::new();

    let state = Arc::new(AppState {
        coordinator,
        hub: hub.clone(),
        hub_settings: config.hub_settings(),
        shutdown: shutdown.clone(),
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Party Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown, config.drain_period()))
    .await?;

    // Closes every live WebSocket connection.
    hub.cancel();

    info!("Party Service shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and drain period is complete.
async fn shutdown_signal(shutdown: CancellationToken, drain: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    // Readiness reports 503 from here on.
    shutdown.cancel();

    if drain.is_zero() {
        info!("Skipping drain period (PARTY_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain.as_secs());
        tokio::time::sleep(drain).await;
        info!("Drain period complete");
    }
}
