//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the pipeline, install signal handlers and bind the listener
//! - Announce the service with the start-up banner
//! - Turn termination signals into a graceful drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including signal installation
//! - Listeners start last (traffic only when the pipeline is built)
//! - The state is `Listening` before the signal watcher runs

use std::io;
use std::sync::Arc;

use serde_json::json;
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::{LifecycleError, ServerState, Shutdown};
use crate::lifecycle::signals::Signals;
use crate::observability::Logger;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid CORS origin {origin:?}")]
    CorsOrigin { origin: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

/// Run the service until a termination signal has been handled.
pub async fn run(config: Arc<ServiceConfig>, logger: Logger) -> Result<(), StartupError> {
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config.clone(), logger.clone(), shutdown.clone())?;
    let signals = Signals::install().map_err(StartupError::Signals)?;

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    shutdown.advance(ServerState::Listening)?;
    announce(&config, &logger);
    watch_signals(signals, shutdown, logger.clone());

    server.run(listener).await?;
    logger.info("Graceful shutdown completed", None);
    Ok(())
}

fn announce(config: &ServiceConfig, logger: &Logger) {
    let base = config.public_base_url();
    logger.info(
        format!("Server running on port {}", config.server.port),
        json!({
            "port": config.server.port,
            "environment": config.environment,
            "apiUrl": format!("{base}/api"),
            "healthCheck": format!("{base}/api/health"),
        }),
    );
}

fn watch_signals(mut signals: Signals, shutdown: Shutdown, logger: Logger) {
    tokio::spawn(async move {
        let signal = signals.recv().await;
        logger.info(
            "Starting graceful shutdown",
            json!({ "signal": signal.to_string() }),
        );
        shutdown.trigger();
    });
}
