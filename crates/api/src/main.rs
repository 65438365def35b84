use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use costkeeper_api::config::ServerConfig;
use costkeeper_api::router::build_app_router;
use costkeeper_api::state::AppState;
use costkeeper_db::DbPool;

const DEFAULT_LOG_FILTER: &str = "costkeeper_api=debug,costkeeper_db=debug,tower_http=debug";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = config.port,
        case_insensitive = config.assignment.case_insensitive,
        retry_attempts = config.assignment.retry_attempts,
        reapply_pool_batch_size = config.assignment.reapply_pool_batch_size,
        "Loaded server configuration"
    );

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = prepare_database(&database_url).await;

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    let app = build_app_router(AppState {
        pool,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Connect, verify the connection and bring the schema up to date.
async fn prepare_database(database_url: &str) -> DbPool {
    let pool = costkeeper_db::create_pool(database_url)
        .await
        .expect("Failed to connect to database");

    costkeeper_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    costkeeper_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let schema_version = costkeeper_db::schema_version(&pool)
        .await
        .expect("Failed to read schema version");
    tracing::info!(?schema_version, "Database ready");

    pool
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.expect("Failed to install Ctrl-C handler");
                tracing::info!("Received SIGINT, shutting down");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
        tracing::info!("Received Ctrl-C, shutting down");
    }
}
