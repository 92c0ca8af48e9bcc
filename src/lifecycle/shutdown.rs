//! Server state and shutdown coordination.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// Where the server is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Starting,
    Listening,
    Draining,
    Stopped,
}

impl ServerState {
    /// Whether the server still answers requests normally.
    pub fn is_serving(&self) -> bool {
        *self < ServerState::Draining
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ServerState::Starting => "starting",
            ServerState::Listening => "listening",
            ServerState::Draining => "draining",
            ServerState::Stopped => "stopped",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move server state from {from} to {to}")]
pub struct LifecycleError {
    pub from: ServerState,
    pub to: ServerState,
}

/// Coordinator for graceful shutdown.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<ServerState>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ServerState::Starting);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ServerState {
        *self.tx.borrow()
    }

    /// Move to `next`, which must lie strictly ahead of the current state.
    pub fn advance(&self, next: ServerState) -> Result<(), LifecycleError> {
        let mut from = next;
        let moved = self.tx.send_if_modified(|current| {
            from = *current;
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });

        if moved {
            Ok(())
        } else {
            Err(LifecycleError { from, to: next })
        }
    }

    /// Begin draining. Returns false when shutdown was already under way.
    pub fn trigger(&self) -> bool {
        self.advance(ServerState::Draining).is_ok()
    }

    /// Resolves once draining has begun.
    pub fn draining(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            let _ = rx.wait_for(|state| !state.is_serving()).await;
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
