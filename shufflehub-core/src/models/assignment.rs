//! Client-facing request and response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::heartbeat::{HealthSignal, ServerResources};
use super::id::ServerId;
use super::tags::TagSet;

/// Outcome of a coordinator request, carried in the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    /// No healthy server matched the request
    InternalError,
    /// Fewer healthy servers than the requested replica count
    NotEnoughServers,
    InvalidRequest,
}

impl StatusCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotEnoughServers => "NOT_ENOUGH_SERVERS",
            Self::InvalidRequest => "INVALID_REQUEST",
        }
    }

    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const fn default_partition_num_per_range() -> u32 {
    1
}

/// Request for a partition-to-server mapping of one shuffle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub app_id: String,
    pub shuffle_id: i32,
    /// First partition, inclusive
    pub partition_range_start: u32,
    /// Last partition, exclusive
    pub partition_range_end: u32,
    pub replica_count: u32,
    #[serde(default)]
    pub required_tags: TagSet,
    /// Consecutive partitions grouped onto the same servers
    #[serde(default = "default_partition_num_per_range")]
    pub partition_num_per_range: u32,
}

impl AssignmentRequest {
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        shuffle_id: i32,
        partition_range_start: u32,
        partition_range_end: u32,
        replica_count: u32,
        required_tags: TagSet,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            shuffle_id,
            partition_range_start,
            partition_range_end,
            replica_count,
            required_tags,
            partition_num_per_range: default_partition_num_per_range(),
        }
    }

    #[must_use]
    pub const fn with_partition_num_per_range(mut self, n: u32) -> Self {
        self.partition_num_per_range = n;
        self
    }

    #[must_use]
    pub const fn partition_count(&self) -> u32 {
        self.partition_range_end.saturating_sub(self.partition_range_start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub status: StatusCode,
    pub partition_to_servers: BTreeMap<u32, Vec<ServerId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AssignmentResponse {
    #[must_use]
    pub const fn success(partition_to_servers: BTreeMap<u32, Vec<ServerId>>) -> Self {
        Self {
            status: StatusCode::Success,
            partition_to_servers,
            message: None,
        }
    }

    #[must_use]
    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            partition_to_servers: BTreeMap::new(),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerListResponse {
    pub servers: Vec<ServerId>,
    pub count: usize,
}

impl ServerListResponse {
    #[must_use]
    pub fn new(servers: Vec<ServerId>) -> Self {
        let count = servers.len();
        Self { servers, count }
    }
}

/// Observability view of one registered server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server_id: ServerId,
    pub ip: String,
    pub port: u16,
    pub health: HealthSignal,
    pub tags: TagSet,
    pub resources: ServerResources,
    pub last_heartbeat: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppHeartbeatResponse {
    pub status: StatusCode,
}
