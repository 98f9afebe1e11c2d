//! Web server using Axum.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use super::api::AppState;
use super::router::create_app_router;
use crate::config::AgencyConfig;
use crate::core::{Agency, Intake};
use crate::error::{Error, Result};
use crate::task::AgentTask;

/// How long queued intake work may take to drain after the listener closes.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an agency node until Ctrl-C, then terminate all hosted agents.
pub async fn run_server(config: &AgencyConfig, task: Arc<dyn AgentTask>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

    let listener = TcpListener::bind(addr).await?;
    let agency = Agency::new(config, task)?;

    tracing::info!(
        node_id = config.node_id,
        mas_id = config.mas_id,
        "Starting agency '{}' on {} (advertised as {})",
        config.name,
        addr,
        config.advertised_address()
    );

    serve(
        listener,
        Arc::clone(&agency),
        config.intake_capacity,
        shutdown_signal(),
    )
    .await?;

    agency.shutdown().await;
    tracing::info!("Agency stopped");
    Ok(())
}

/// Serve the API for `agency` on an already bound listener until `shutdown`
/// resolves.
pub async fn serve<F>(
    listener: TcpListener,
    agency: Arc<Agency>,
    intake_capacity: usize,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (intake, worker) = Intake::start(Arc::clone(&agency), intake_capacity);

    let app = create_app_router(AppState { agency, intake }).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    // The router held the last intake handles, so the worker now drains and exits.
    if tokio::time::timeout(DRAIN_TIMEOUT, worker).await.is_err() {
        tracing::warn!("Intake worker did not drain in time");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
