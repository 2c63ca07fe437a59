//! Coordinator process lifecycle
//!
//! Owns the cluster registry, the application registry, their expiry sweeps
//! and the HTTP listener. Shutdown is driven by a single cancellation token.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use shufflehub_core::config::CoordinatorConfig;

use crate::discovery::{ApplicationManager, ClusterManager};
use crate::error::{Error, Result};
use crate::http::create_router;
use crate::service::CoordinatorService;

pub struct CoordinatorServer {
    bind_address: String,
    service: CoordinatorService,
    shutdown_token: CancellationToken,
    sweep_handles: Vec<JoinHandle<()>>,
}

impl CoordinatorServer {
    #[must_use]
    pub fn new(config: &CoordinatorConfig) -> Self {
        let cluster = Arc::new(ClusterManager::new(config.heartbeat_timeout()));
        let apps = Arc::new(ApplicationManager::new(config.app_expired()));
        let service = CoordinatorService::from_config(cluster, apps, config);

        Self {
            bind_address: config.bind_address(),
            service,
            shutdown_token: CancellationToken::new(),
            sweep_handles: Vec::new(),
        }
    }

    #[must_use]
    pub const fn service(&self) -> &CoordinatorService {
        &self.service
    }

    /// Start the server and application expiry sweeps
    pub fn start_background_tasks(&mut self) {
        if !self.sweep_handles.is_empty() {
            return;
        }
        self.sweep_handles.push(self.service.cluster().start());
        self.sweep_handles.push(self.service.apps().start());
        info!(
            heartbeat_timeout_ms = self.service.cluster().heartbeat_timeout().as_millis() as u64,
            "Coordinator expiry sweeps started"
        );
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self.bind_address.parse().map_err(|e| {
            Error::Configuration(format!(
                "Invalid coordinator address '{}': {e}",
                self.bind_address
            ))
        })?;
        let listener = TcpListener::bind(addr).await?;
        Ok(listener)
    }

    /// Serve the HTTP API on `listener` until [`Self::shutdown`] is called
    pub fn serve(&self, listener: TcpListener) -> JoinHandle<()> {
        let router = create_router(self.service.clone());
        let token = self.shutdown_token.clone();

        tokio::spawn(async move {
            match listener.local_addr() {
                Ok(addr) => info!("Coordinator listening on {}", addr),
                Err(e) => error!("Failed to read coordinator listener address: {}", e),
            }

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
            {
                error!("Coordinator HTTP server error: {}", e);
            }

            info!("Coordinator HTTP server shut down gracefully");
        })
    }

    /// Stop the HTTP server and both expiry sweeps
    pub async fn shutdown(&mut self) {
        info!("Shutting down coordinator...");
        self.shutdown_token.cancel();
        self.service.cluster().shutdown();
        self.service.apps().shutdown();

        for handle in self.sweep_handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Expiry sweep task failed: {}", e);
            }
        }
    }
}
