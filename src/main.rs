//! Chess application backend.
//!
//! Resolves configuration from the environment (optionally layered over a
//! TOML file), builds the logger and serves until SIGTERM or SIGINT.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chess_backend::config::{load_config, schema::LoggingConfig};
use chess_backend::lifecycle::startup;
use chess_backend::observability::{layers, subscriber, Logger};
use clap::Parser;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "chess-backend", version, about = "Chess application backend")]
struct Cli {
    /// Base configuration file; environment variables override it.
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    subscriber::init();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref(), std::env::vars()) {
        Ok(config) => config,
        Err(err) => {
            let logger = Logger::builder(LoggingConfig::default().service_name)
                .layer(layers::console(true))
                .build();
            logger.error(
                "Failed to initialize application",
                json!({ "error": err.to_string() }),
            );
            return ExitCode::FAILURE;
        }
    };

    let logger = Logger::from_config(&config.logging, config.is_production());
    match startup::run(Arc::new(config), logger.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            logger.error(
                "Failed to initialize application",
                json!({ "error": err.to_string() }),
            );
            ExitCode::FAILURE
        }
    }
}
