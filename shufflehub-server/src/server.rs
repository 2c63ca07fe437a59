//! Shuffle server process lifecycle
//!
//! Wires the storage health check to the heartbeat reporter and owns both
//! background tasks.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use shufflehub_core::bootstrap::default_advertised_ip;
use shufflehub_core::config::ShuffleServerConfig;
use shufflehub_core::models::{ServerId, ServerResources, TagSet};
use shufflehub_core::HeartbeatSink;

use crate::error::{Error, Result};
use crate::health::{HealthCheck, LocalStorageChecker, Thresholds};
use crate::heartbeat::HeartbeatReporter;
use crate::storage::{LocalDiskSampler, UsageSampler};

pub struct ShuffleServer {
    health: Arc<HealthCheck>,
    reporter: Arc<HeartbeatReporter>,
    handles: Vec<JoinHandle<()>>,
}

impl ShuffleServer {
    /// Build a server that samples the local disks backing its storage paths
    pub fn new(config: &ShuffleServerConfig, sink: Arc<dyn HeartbeatSink>) -> Result<Self> {
        Self::with_sampler(config, sink, Arc::new(LocalDiskSampler))
    }

    pub fn with_sampler(
        config: &ShuffleServerConfig,
        sink: Arc<dyn HeartbeatSink>,
        sampler: Arc<dyn UsageSampler>,
    ) -> Result<Self> {
        let health = if config.health_check_enabled {
            if config.storage_base_path.is_empty() {
                return Err(Error::Configuration(
                    "health check enabled but no storage_base_path configured".to_string(),
                ));
            }
            let checker = LocalStorageChecker::new(
                config.storage_base_path.iter().map(PathBuf::from),
                Thresholds::new(
                    config.health_storage_max_usage_percentage,
                    config.health_storage_recovery_usage_percentage,
                ),
                config.health_min_storage_percentage,
                sampler,
            );
            HealthCheck::new(checker, config.health_check_interval())
        } else {
            HealthCheck::disabled()
        };
        let health = Arc::new(health);

        let ip = config.ip.clone().unwrap_or_else(default_advertised_ip);
        let server_id = config
            .id
            .clone()
            .map_or_else(|| ServerId::new(&ip, config.port), ServerId::from_string);
        let tags: TagSet = config.tags.iter().map(String::as_str).collect();
        let resources = ServerResources {
            available_memory: config.buffer_capacity,
            ..ServerResources::default()
        };

        let reporter = Arc::new(HeartbeatReporter::new(
            server_id,
            ip,
            config.port,
            tags,
            resources,
            health.clone(),
            sink,
            config.heartbeat_interval(),
        ));

        Ok(Self {
            health,
            reporter,
            handles: Vec::new(),
        })
    }

    #[must_use]
    pub fn server_id(&self) -> &ServerId {
        self.reporter.server_id()
    }

    #[must_use]
    pub const fn health(&self) -> &Arc<HealthCheck> {
        &self.health
    }

    /// Run the first health check, then start the periodic tasks
    pub async fn start(&mut self) {
        if !self.handles.is_empty() {
            return;
        }
        self.health.check_once().await;
        self.handles.push(self.health.start());
        self.handles.push(self.reporter.start());
        info!(
            server_id = %self.server_id(),
            tags = %self.reporter.tags(),
            health_check = self.health.is_enabled(),
            "Shuffle server started"
        );
    }

    pub async fn shutdown(&mut self) {
        info!(server_id = %self.server_id(), "Shutting down shuffle server...");
        self.health.shutdown();
        self.reporter.shutdown();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!("Shuffle server task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shufflehub_core::config::StorageType;
    use shufflehub_core::models::{Heartbeat, HeartbeatResponse};

    struct Discard;

    #[async_trait::async_trait]
    impl HeartbeatSink for Discard {
        async fn send_heartbeat(
            &self,
            _heartbeat: Heartbeat,
        ) -> shufflehub_core::Result<HeartbeatResponse> {
            Ok(HeartbeatResponse { accepted: true })
        }
    }

    #[test]
    fn test_identity_from_ip_and_port() {
        let config = ShuffleServerConfig {
            ip: Some("10.1.2.3".to_string()),
            port: 20001,
            tags: vec!["gpu".to_string()],
            ..ShuffleServerConfig::default()
        };
        let server = ShuffleServer::new(&config, Arc::new(Discard)).unwrap();
        assert_eq!(server.server_id().as_str(), "10.1.2.3-20001");
        assert!(!server.health().is_enabled());
    }

    #[test]
    fn test_explicit_identity_wins() {
        let config = ShuffleServerConfig {
            id: Some("worker-7".to_string()),
            ip: Some("10.1.2.3".to_string()),
            ..ShuffleServerConfig::default()
        };
        let server = ShuffleServer::new(&config, Arc::new(Discard)).unwrap();
        assert_eq!(server.server_id().as_str(), "worker-7");
    }

    #[test]
    fn test_enabled_check_needs_paths() {
        let config = ShuffleServerConfig {
            ip: Some("10.1.2.3".to_string()),
            storage_type: StorageType::LocalFile,
            health_check_enabled: true,
            ..ShuffleServerConfig::default()
        };
        assert!(matches!(
            ShuffleServer::new(&config, Arc::new(Discard)),
            Err(Error::Configuration(_))
        ));
    }
}
