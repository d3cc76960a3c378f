use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autocrm_api::background::triage_worker;
use autocrm_api::config::ServerConfig;
use autocrm_api::router::build_app_router;
use autocrm_api::triage::TriageService;
use autocrm_api::{state, ws};
use autocrm_events::{EventBus, TicketFeed};

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autocrm_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = autocrm_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    autocrm_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    autocrm_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    tracing::info!("Event bus created");

    // Spawn the ticket feed (fans ticket events out to WebSocket watchers).
    let ticket_feed = Arc::new(TicketFeed::new());
    let feed_handle = {
        let feed = Arc::clone(&ticket_feed);
        let receiver = event_bus.subscribe();
        tokio::spawn(async move { feed.run(receiver).await })
    };

    // --- Triage ---
    let cancel = tokio_util::sync::CancellationToken::new();
    let triage = TriageService::from_config(pool.clone(), Arc::clone(&event_bus), &config.triage)
        .map(Arc::new);
    let triage_handle = match &triage {
        Some(service) => {
            let handle = tokio::spawn(triage_worker::run(
                Arc::clone(service),
                event_bus.subscribe(),
                cancel.clone(),
            ));
            Some(handle)
        }
        None => {
            tracing::warn!("OPENAI_API_KEY is not set, automatic triage is disabled");
            None
        }
    };

    tracing::info!(
        triage_enabled = triage.is_some(),
        "Event services started (ticket feed, triage worker)"
    );

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
        ticket_feed,
        triage,
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Let in-flight triage runs finish within the drain budget.
    cancel.cancel();
    if let Some(handle) = triage_handle {
        let drain = Duration::from_secs(config.shutdown_timeout_secs);
        if tokio::time::timeout(drain, handle).await.is_err() {
            tracing::warn!(
                drain_secs = drain.as_secs(),
                "Triage worker did not drain in time"
            );
        }
        tracing::info!("Triage worker stopped");
    }

    // Dropping the last bus handle closes the channel, which stops the feed.
    // The router state was moved into the server, which has been dropped.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), feed_handle).await;
    tracing::info!("Event services shut down");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Heartbeat task stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
