// src/main.rs
mod config;
mod db;
mod eligibility;
mod error;
mod handlers;
mod identity;
mod memory;
mod models;
mod polls;
mod repository;
mod routes;
mod state;
mod tally;
mod votes;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::Handle;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use db::PgPollRepository;
use identity::HeaderIdentityProvider;
use memory::MemoryPollRepository;
use polls::PollService;
use repository::PollRepository;
use state::AppState;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // RUST_LOG may come from .env, so load it before the filter is built.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config = Config::load()?;

    let repo: Arc<dyn PollRepository> = match &config.database {
        Some(database) => {
            info!("Connecting to PostgreSQL");
            Arc::new(PgPollRepository::new(db::create_pool(database).await?))
        }
        None => Arc::new(MemoryPollRepository::new()),
    };

    let polls = PollService::new(repo, config.public_base_url.clone());
    let identity = HeaderIdentityProvider::new(config.identity_header.clone());
    let app = routes::create_routes(AppState::new(polls, identity))
        .layer(routes::cors_layer(&config)?);

    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone()));

    info!("Server running on {address}");
    axum_server::bind(address)
        .handle(handle)
        .serve(app.into_make_service())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
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

    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}
