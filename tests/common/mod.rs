//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chess_backend::config::ServiceConfig;
use chess_backend::lifecycle::StartupError;
use chess_backend::observability::{Level, LogRecord, Logger, MemoryLayer};
use chess_backend::{HttpServer, Shutdown};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A backend serving on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub logs: MemoryLayer,
    handle: JoinHandle<Result<(), StartupError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger a graceful shutdown and wait for the server to stop.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }

    /// Wait until `count` records with `message` have been logged.
    pub async fn wait_for_logs(&self, message: &str, count: usize) -> Vec<LogRecord> {
        for _ in 0..100 {
            let records = self.logs.with_message(message);
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.logs.with_message(message)
    }
}

/// Start the full pipeline for `config` with an in-memory log sink.
pub async fn spawn(config: ServiceConfig) -> TestServer {
    let logs = MemoryLayer::new();
    let logger = Logger::builder(config.logging.service_name.clone())
        .level(Level::Debug)
        .layer(logs.clone())
        .build();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(Arc::new(config), logger, shutdown.clone())
        .expect("pipeline should build");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run(listener));

    TestServer {
        addr,
        shutdown,
        logs,
        handle,
    }
}

pub fn production() -> ServiceConfig {
    ServiceConfig {
        environment: "production".to_string(),
        ..ServiceConfig::default()
    }
}
