//! Periodic heartbeat delivery to the coordinator

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use shufflehub_core::metrics::server as metrics;
use shufflehub_core::models::{Heartbeat, ServerId, ServerResources, TagSet};
use shufflehub_core::HeartbeatSink;

use crate::health::HealthCheck;

pub struct HeartbeatReporter {
    server_id: ServerId,
    ip: String,
    port: u16,
    tags: TagSet,
    resources: ServerResources,
    health: Arc<HealthCheck>,
    sink: Arc<dyn HeartbeatSink>,
    heartbeat_interval: Duration,
    last_timestamp: AtomicI64,
    cancel_token: CancellationToken,
}

impl HeartbeatReporter {
    /// `tags` always gains the server version tag
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        server_id: ServerId,
        ip: String,
        port: u16,
        mut tags: TagSet,
        resources: ServerResources,
        health: Arc<HealthCheck>,
        sink: Arc<dyn HeartbeatSink>,
        heartbeat_interval: Duration,
    ) -> Self {
        tags.insert(shufflehub_core::models::SHUFFLE_SERVER_VERSION);
        Self {
            server_id,
            ip,
            port,
            tags,
            resources,
            health,
            sink,
            heartbeat_interval,
            last_timestamp: AtomicI64::new(0),
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    #[must_use]
    pub const fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Snapshot of the current health, stamped with a strictly increasing timestamp
    pub fn build_heartbeat(&self) -> Heartbeat {
        let heartbeat = Heartbeat::new(
            self.server_id.clone(),
            self.ip.clone(),
            self.port,
            self.health.current(),
            self.tags.clone(),
        )
        .with_resources(self.resources);

        let wall = heartbeat.timestamp;
        let previous = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wall.max(last + 1))
            })
            .unwrap_or(wall);
        heartbeat.with_timestamp(wall.max(previous + 1))
    }

    /// Send one heartbeat; returns whether it reached the coordinator
    pub async fn send_once(&self) -> bool {
        let heartbeat = self.build_heartbeat();
        let healthy = heartbeat.health.healthy;

        match self.sink.send_heartbeat(heartbeat).await {
            Ok(resp) => {
                tracing::debug!(
                    server_id = %self.server_id,
                    healthy,
                    accepted = resp.accepted,
                    "Heartbeat sent"
                );
                true
            }
            Err(e) => {
                metrics::HEARTBEAT_FAILURES_TOTAL.inc();
                tracing::warn!(
                    server_id = %self.server_id,
                    error = %e,
                    "Failed to send heartbeat to coordinator"
                );
                false
            }
        }
    }

    /// Start sending heartbeats every interval, the first one immediately
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let reporter = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            let mut timer = interval(reporter.heartbeat_interval.max(Duration::from_millis(1)));
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!(
                            server_id = %reporter.server_id,
                            "Heartbeat reporter shutting down"
                        );
                        return;
                    }
                    _ = timer.tick() => {
                        reporter.send_once().await;
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
