//! Registry of shuffle servers known to the coordinator
//!
//! Servers appear on their first heartbeat and disappear when the expiry
//! sweep finds them silent for longer than the heartbeat timeout. Health is
//! whatever the server last reported; staleness always overrides it.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use shufflehub_core::metrics::coordinator as metrics;
use shufflehub_core::models::{
    HealthSignal, Heartbeat, ServerId, ServerInfo, ServerResources, TagSet,
};

/// Registry entry for one shuffle server
#[derive(Debug, Clone)]
pub struct ServerNode {
    pub id: ServerId,
    pub ip: String,
    pub port: u16,
    pub health: HealthSignal,
    pub tags: TagSet,
    pub resources: ServerResources,
    /// Coordinator-side receive time, used for expiry
    pub last_heartbeat_at: Instant,
    /// Wall-clock receive time, for display only
    pub last_heartbeat: DateTime<Utc>,
    /// Sender timestamp of the last applied heartbeat
    pub heartbeat_timestamp: i64,
    registered_seq: u64,
}

impl ServerNode {
    fn from_heartbeat(heartbeat: Heartbeat, now: Instant, registered_seq: u64) -> Self {
        Self {
            id: heartbeat.server_id,
            ip: heartbeat.ip,
            port: heartbeat.port,
            health: heartbeat.health,
            tags: heartbeat.tags,
            resources: heartbeat.resources,
            last_heartbeat_at: now,
            last_heartbeat: Utc::now(),
            heartbeat_timestamp: heartbeat.timestamp,
            registered_seq,
        }
    }

    fn apply(&mut self, heartbeat: Heartbeat, now: Instant) {
        self.ip = heartbeat.ip;
        self.port = heartbeat.port;
        self.health = heartbeat.health;
        self.tags = heartbeat.tags;
        self.resources = heartbeat.resources;
        self.last_heartbeat_at = self.last_heartbeat_at.max(now);
        self.last_heartbeat = Utc::now();
        self.heartbeat_timestamp = heartbeat.timestamp;
    }

    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.health.healthy
    }

    /// Check if the server missed its heartbeat deadline
    #[must_use]
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_heartbeat_at) > timeout
    }

    #[must_use]
    pub fn matches_tags(&self, required: &TagSet) -> bool {
        self.tags.is_superset_of(required)
    }

    /// Order in which this entry was created; later re-registrations sort last
    #[must_use]
    pub const fn registered_seq(&self) -> u64 {
        self.registered_seq
    }

    #[must_use]
    pub fn to_info(&self) -> ServerInfo {
        ServerInfo {
            server_id: self.id.clone(),
            ip: self.ip.clone(),
            port: self.port,
            health: self.health,
            tags: self.tags.clone(),
            resources: self.resources,
            last_heartbeat: self.last_heartbeat,
        }
    }
}

/// What a heartbeat did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// Unknown or previously expired server, fresh entry created
    Registered,
    Updated,
    /// Not newer than the last applied heartbeat; ignored
    Stale,
}

impl HeartbeatResult {
    #[must_use]
    pub const fn is_applied(self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// Coordinator-resident registry of shuffle servers
///
/// Entries live in a sharded map, so heartbeats for different servers never
/// contend and readers copy entries out instead of holding references.
pub struct ClusterManager {
    nodes: DashMap<ServerId, ServerNode>,
    heartbeat_timeout: Duration,
    next_seq: AtomicU64,
    cancel_token: CancellationToken,
}

impl ClusterManager {
    #[must_use]
    pub fn new(heartbeat_timeout: Duration) -> Self {
        Self {
            nodes: DashMap::new(),
            heartbeat_timeout,
            next_seq: AtomicU64::new(0),
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// Apply a heartbeat received at `now`
    ///
    /// Heartbeats are ordered per server by their sender timestamp; one that is
    /// not newer than the last applied heartbeat is dropped. A heartbeat for an
    /// entry that already went stale starts a new lifecycle, exactly as if the
    /// sweep had removed the entry first.
    pub fn ingest_heartbeat(&self, heartbeat: Heartbeat, now: Instant) -> HeartbeatResult {
        let result = self.apply_heartbeat(heartbeat, now);
        // Entry guard is released here; counting takes every shard lock
        if result.is_applied() {
            self.refresh_gauges();
        }
        result
    }

    fn apply_heartbeat(&self, heartbeat: Heartbeat, now: Instant) -> HeartbeatResult {
        match self.nodes.entry(heartbeat.server_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let node = occupied.get_mut();
                if node.is_stale(now, self.heartbeat_timeout) {
                    tracing::info!(
                        server_id = %heartbeat.server_id,
                        healthy = heartbeat.health.healthy,
                        "Expired shuffle server re-registered"
                    );
                    let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                    *node = ServerNode::from_heartbeat(heartbeat, now, seq);
                    return HeartbeatResult::Registered;
                }

                if heartbeat.timestamp <= node.heartbeat_timestamp {
                    tracing::debug!(
                        server_id = %heartbeat.server_id,
                        timestamp = heartbeat.timestamp,
                        last_applied = node.heartbeat_timestamp,
                        "Ignoring out-of-order heartbeat"
                    );
                    return HeartbeatResult::Stale;
                }

                if node.health.healthy != heartbeat.health.healthy {
                    if heartbeat.health.healthy {
                        tracing::info!(
                            server_id = %heartbeat.server_id,
                            usage_ratio = heartbeat.health.usage_ratio,
                            "Shuffle server recovered"
                        );
                    } else {
                        tracing::warn!(
                            server_id = %heartbeat.server_id,
                            usage_ratio = heartbeat.health.usage_ratio,
                            "Shuffle server reported unhealthy"
                        );
                    }
                }
                node.apply(heartbeat, now);
                HeartbeatResult::Updated
            }
            Entry::Vacant(vacant) => {
                tracing::info!(
                    server_id = %heartbeat.server_id,
                    tags = %heartbeat.tags,
                    healthy = heartbeat.health.healthy,
                    "Shuffle server registered"
                );
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                vacant.insert(ServerNode::from_heartbeat(heartbeat, now, seq));
                HeartbeatResult::Registered
            }
        }
    }

    /// Live, healthy servers whose tags include `required`, in registration order
    #[must_use]
    pub fn get_healthy_nodes(&self, required: &TagSet) -> Vec<ServerNode> {
        self.snapshot(Instant::now(), |node| node.is_healthy() && node.matches_tags(required))
    }

    /// Live servers whose tags include `required`, regardless of health
    #[must_use]
    pub fn get_all_nodes(&self, required: &TagSet) -> Vec<ServerNode> {
        self.snapshot(Instant::now(), |node| node.matches_tags(required))
    }

    #[must_use]
    pub fn get_node(&self, id: &ServerId) -> Option<ServerNode> {
        let now = Instant::now();
        self.nodes
            .get(id)
            .filter(|node| !node.is_stale(now, self.heartbeat_timeout))
            .map(|node| node.clone())
    }

    /// Number of entries, including any not yet swept
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Entries currently reporting healthy, including any not yet swept
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.nodes.iter().filter(|entry| entry.is_healthy()).count()
    }

    fn refresh_gauges(&self) {
        metrics::TOTAL_SERVER_NUM.set(self.node_count() as i64);
        metrics::HEALTHY_SERVER_NUM.set(self.healthy_count() as i64);
    }

    fn snapshot(&self, now: Instant, keep: impl Fn(&ServerNode) -> bool) -> Vec<ServerNode> {
        let mut nodes: Vec<ServerNode> = self
            .nodes
            .iter()
            .filter(|entry| !entry.is_stale(now, self.heartbeat_timeout) && keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        nodes.sort_by_key(ServerNode::registered_seq);
        nodes
    }

    /// Evict every server silent for longer than the heartbeat timeout
    ///
    /// Walks a snapshot of ids and removes entries one at a time, so a sweep
    /// never holds more than one shard lock.
    pub fn expire_stale(&self, now: Instant) -> Vec<ServerId> {
        let ids: Vec<ServerId> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        let timeout = self.heartbeat_timeout;

        let mut expired = Vec::new();
        for id in ids {
            if let Some((id, node)) = self
                .nodes
                .remove_if(&id, |_, node| node.is_stale(now, timeout))
            {
                tracing::warn!(
                    server_id = %id,
                    last_heartbeat = %node.last_heartbeat,
                    was_healthy = node.is_healthy(),
                    "Shuffle server expired: heartbeat timed out"
                );
                expired.push(id);
            }
        }

        if !expired.is_empty() {
            metrics::EXPIRED_SERVERS_TOTAL.inc_by(expired.len() as u64);
        }
        self.refresh_gauges();

        expired
    }

    /// Start the periodic expiry sweep
    ///
    /// Runs three times per heartbeat timeout, so a silent server is gone at
    /// most a third of a timeout after its deadline.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        let cancel_token = self.cancel_token.clone();
        let period = (self.heartbeat_timeout / 3).max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => {
                        tracing::info!("Cluster expiry sweep shutting down");
                        return;
                    }
                    _ = timer.tick() => {
                        manager.expire_stale(Instant::now());
                    }
                }
            }
        })
    }

    /// Stop the expiry sweep
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
