use std::io::ErrorKind;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use passport_backend::config::{AppConfig, AppState};
use passport_backend::repositories::sessions;
use passport_backend::{db, routes};

/// Exit code for configuration problems: missing required environment
/// variables, bad values, unreachable database at startup.
const EXIT_CONFIG: u8 = 1;

/// Exit code for a failed schema migration.
const EXIT_MIGRATION: u8 = 2;

/// How often the background sweeps run.
const SWEEP_INTERVAL_SECS: u64 = 60 * 60;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file (if present)
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(err) => {
            tracing::error!(error = %err, "Configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let pool = match db::create_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "Database is unreachable at startup");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    if let Err(err) = db::run_migrations(&pool).await {
        tracing::error!(error = %err, "Migration failed");
        return ExitCode::from(EXIT_MIGRATION);
    }

    let state = AppState::new(pool.clone(), config.clone());
    spawn_sweepers(&state);

    let app = routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.listen_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == ErrorKind::AddrInUse => {
            tracing::error!(%addr, "Port is already in use");
            return ExitCode::from(EXIT_CONFIG);
        }
        Err(err) => {
            tracing::error!(error = %err, %addr, "Failed to bind listener");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing::info!(%addr, "Passport is ready to accept connections");

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let server = axum::serve(listener, make_service).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        tracing::error!(error = %err, "Server error");
    }

    tracing::info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Periodic cleanup: drop sessions past their lifetime and evict idle
/// rate-limit buckets. Both are also enforced at read time; the sweeps
/// only bound storage growth.
fn spawn_sweepers(state: &AppState) {
    let pool = state.pool.clone();
    let lifetime = state.config.session_lifetime;
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        ticker.tick().await; // first tick is immediate
        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now() - lifetime;
            match sessions::sweep_expired(&pool, cutoff).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Swept expired sessions"),
                Err(err) => tracing::error!(error = %err, "Session sweep failed"),
            }
        }
    });

    let limiter = state.limiter.clone();
    let window = state.config.rate_limit_signin_window;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(window);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            limiter.sweep();
        }
    });
}

/// Waits for a shutdown signal and initiates graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Starting graceful shutdown...");
}
