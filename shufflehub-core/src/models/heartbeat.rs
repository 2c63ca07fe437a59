//! Heartbeat payload sent by shuffle servers to the coordinator

use serde::{Deserialize, Serialize};

use super::id::ServerId;
use super::tags::TagSet;

/// A shuffle server's self-assessed health and the storage usage behind it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub healthy: bool,
    /// Used over total storage capacity, in `[0, 1]`
    pub usage_ratio: f64,
}

impl HealthSignal {
    #[must_use]
    pub const fn healthy(usage_ratio: f64) -> Self {
        Self {
            healthy: true,
            usage_ratio,
        }
    }

    #[must_use]
    pub const fn unhealthy(usage_ratio: f64) -> Self {
        Self {
            healthy: false,
            usage_ratio,
        }
    }
}

impl Default for HealthSignal {
    fn default() -> Self {
        Self::healthy(0.0)
    }
}

/// Memory and flush pressure reported alongside health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResources {
    pub used_memory: i64,
    pub pre_allocated_memory: i64,
    pub available_memory: i64,
    pub event_num_in_flush: i32,
}

/// Periodic liveness and health report from one shuffle server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub server_id: ServerId,
    pub ip: String,
    pub port: u16,
    pub health: HealthSignal,
    pub tags: TagSet,
    #[serde(default)]
    pub resources: ServerResources,
    /// Sender's wall clock in milliseconds; orders heartbeats per server
    pub timestamp: i64,
}

impl Heartbeat {
    #[must_use]
    pub fn new(
        server_id: ServerId,
        ip: String,
        port: u16,
        health: HealthSignal,
        tags: TagSet,
    ) -> Self {
        Self {
            server_id,
            ip,
            port,
            health,
            tags,
            resources: ServerResources::default(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub const fn with_resources(mut self, resources: ServerResources) -> Self {
        self.resources = resources;
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Coordinator's answer to a heartbeat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// False when the heartbeat was older than one already applied
    pub accepted: bool,
}
