//! Elidune Circulation Server
//!
//! REST API over the circulation engine, backed by PostgreSQL.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use elidune_circulation::{
    api,
    config::AppConfig,
    repository::{patrons::PatronsRepository, Repository},
    services::{
        clock::{Clock, SystemClock},
        email::EmailNotifier,
        notifications::{LogNotifier, NotificationDispatcher},
        patrons::PatronDirectory,
        sweeper::ExpirySweeper,
        Services,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("elidune_circulation={},tower_http=debug", config.logging.level).into()
    });
    let json = config.logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!("Starting Elidune Circulation v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    // Wire the engine
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let patrons: Arc<dyn PatronDirectory> = Arc::new(PatronsRepository::new(
        pool.clone(),
        clock.clone(),
        config.circulation.default_max_loans,
    ));
    let notifier: Arc<dyn NotificationDispatcher> = if config.email.enabled {
        tracing::info!("Hold notices sent by e-mail through {}", config.email.smtp_host);
        Arc::new(EmailNotifier::new(config.email.clone(), patrons.clone()))
    } else {
        Arc::new(LogNotifier)
    };

    let services = Services::new(
        Arc::new(Repository::new(pool)),
        patrons,
        notifier,
        clock,
        config.circulation.clone(),
    );

    let (sweeper, sweeper_task) = ExpirySweeper::spawn(
        services.reservations.clone(),
        Duration::from_secs(config.circulation.sweep_interval_secs.max(1)),
    );

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = api::router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.shutdown().await;
    sweeper_task.await.context("Expiry sweeper panicked")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
