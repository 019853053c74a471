//! The serving process.
//!
//! [`ServerHandle::spawn`] binds a listener and runs the axum app on its own
//! task; [`ServerHandle::shutdown`] stops it gracefully.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use emulator_common::{EmulatorError, ServerConfigFile};

/// Address test-mode sessions bind to.
pub const TEST_MODE_BIND_ADDR: &str = "127.0.0.1:0";

/// Configuration for the serving process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind outside of test mode.
    pub bind_addr: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// How long `stop` waits for in-flight requests before aborting.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&ServerConfigFile::default())
    }
}

impl From<&ServerConfigFile> for ServerConfig {
    fn from(file: &ServerConfigFile) -> Self {
        Self {
            bind_addr: file.bind_addr.clone(),
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            shutdown_timeout: Duration::from_secs(file.shutdown_timeout_secs),
        }
    }
}

impl ServerConfig {
    /// Use a different bind address.
    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Use a different request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }
}

/// A running server task.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), io::Error>>,
}

impl ServerHandle {
    /// Bind `bind_addr` and serve `app` until shut down.
    ///
    /// # Errors
    ///
    /// Returns [`EmulatorError::Bind`] if the address cannot be bound.
    pub async fn spawn(bind_addr: &str, app: Router) -> Result<Self, EmulatorError> {
        let bind_error = |source: io::Error| EmulatorError::Bind {
            addr: bind_addr.to_string(),
            source,
        };

        let listener = TcpListener::bind(bind_addr).await.map_err(bind_error)?;
        let addr = listener.local_addr().map_err(bind_error)?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!(addr = %addr, "Serving process started");

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    /// Address the server is bound to.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shut down gracefully, aborting the task after `timeout`.
    pub async fn shutdown(mut self, timeout: Duration) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(Ok(()))) => info!(addr = %self.addr, "Serving process stopped"),
            Ok(Ok(Err(e))) => warn!(addr = %self.addr, error = %e, "Serving process failed"),
            Ok(Err(e)) => warn!(addr = %self.addr, error = %e, "Serving task ended abnormally"),
            Err(_) => {
                warn!(
                    addr = %self.addr,
                    timeout_secs = timeout.as_secs(),
                    "Graceful shutdown timed out, aborting"
                );
                self.handle.abort();
                // Wait for the task to drop so the listener is released.
                let _ = (&mut self.handle).await;
            }
        }
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("addr", &self.addr)
            .finish_non_exhaustive()
    }
}
