//! Boardvote server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use boardvote_api::{app, middleware::AppState};
use boardvote_common::Config;
use boardvote_core::{
    HttpRosterProvider, NoRosterProvider, RosterProvider, VoteLifecycleService, VoteQueryService,
    VoteRepositories,
};
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

/// Install the tracing subscriber; `json` switches to JSON log lines.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "boardvote=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Pick the roster source: the board directory when configured, otherwise
/// votes must be opened with an inline roster.
fn roster_provider(config: &Config) -> Result<Arc<dyn RosterProvider>, Box<dyn std::error::Error>> {
    match config.roster.directory_url.as_deref() {
        Some(url) => {
            let timeout = Duration::from_secs(config.roster.timeout_secs);
            info!(directory_url = url, "Using roster directory");
            Ok(Arc::new(HttpRosterProvider::new(url, timeout)?))
        }
        None => {
            info!("No roster directory configured; votes need an inline roster to open");
            Ok(Arc::new(NoRosterProvider))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    init_tracing(config.logging.json);
    info!("Starting boardvote server...");

    // Connect to database
    let db = boardvote_db::init(&config).await?;
    info!("Connected to database");

    // Run migrations
    info!("Running database migrations...");
    boardvote_db::migrate(&db).await?;
    info!("Migrations completed");

    // Services
    let repos = VoteRepositories::new(Arc::new(db));
    let state = AppState {
        lifecycle: VoteLifecycleService::new(
            repos.clone(),
            roster_provider(&config)?,
            config.voting.clone(),
        ),
        query: VoteQueryService::new(repos),
    };

    let app = app(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    let ip: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((ip, config.server.port));
    info!(%addr, url = %config.server.url, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
