//! Partition assignment over the healthy part of the cluster
//!
//! Candidates are re-read from the registry on every request; nothing about a
//! previous healthy set is remembered between calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use shufflehub_core::config::DEFAULT_MAX_PARTITIONS_PER_REQUEST;
use shufflehub_core::models::{AssignmentRequest, ServerId, StatusCode, TagSet};

use crate::discovery::{ClusterManager, ServerNode};

/// Why a request could not be planned
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("no healthy shuffle server matches tags {0}")]
    NoHealthyServers(TagSet),

    #[error("{required} replicas requested but only {available} healthy shuffle servers available")]
    NotEnoughServers { required: usize, available: usize },

    #[error("invalid assignment request: {0}")]
    InvalidRequest(String),
}

impl PlanError {
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NoHealthyServers(_) => StatusCode::InternalError,
            Self::NotEnoughServers { .. } => StatusCode::NotEnoughServers,
            Self::InvalidRequest(_) => StatusCode::InvalidRequest,
        }
    }
}

/// Maps each partition of a shuffle to `replica_count` distinct healthy servers
pub struct AssignmentPlanner {
    cluster: Arc<ClusterManager>,
    shuffle_nodes_max: usize,
    max_partitions_per_request: u32,
}

impl AssignmentPlanner {
    #[must_use]
    pub fn new(cluster: Arc<ClusterManager>, shuffle_nodes_max: usize) -> Self {
        Self {
            cluster,
            shuffle_nodes_max: shuffle_nodes_max.max(1),
            max_partitions_per_request: DEFAULT_MAX_PARTITIONS_PER_REQUEST,
        }
    }

    /// Reject requests spanning more than `max` partitions
    #[must_use]
    pub fn with_max_partitions_per_request(mut self, max: u32) -> Self {
        self.max_partitions_per_request = max.max(1);
        self
    }

    pub fn plan(
        &self,
        request: &AssignmentRequest,
    ) -> Result<BTreeMap<u32, Vec<ServerId>>, PlanError> {
        validate(request, self.max_partitions_per_request)?;

        let healthy = self.cluster.get_healthy_nodes(&request.required_tags);
        if healthy.is_empty() {
            return Err(PlanError::NoHealthyServers(request.required_tags.clone()));
        }

        let candidates = self.candidates(healthy);
        let replicas = request.replica_count as usize;
        if replicas > candidates.len() {
            return Err(PlanError::NotEnoughServers {
                required: replicas,
                available: candidates.len(),
            });
        }

        let assignment = assign_ranges(request, &candidates);
        tracing::debug!(
            app_id = %request.app_id,
            shuffle_id = request.shuffle_id,
            partitions = assignment.len(),
            candidates = candidates.len(),
            "Planned shuffle assignment"
        );
        Ok(assignment)
    }

    /// Least loaded servers first, capped at `shuffle_nodes_max`
    ///
    /// The sort is stable, so equally loaded servers keep registration order.
    fn candidates(&self, mut nodes: Vec<ServerNode>) -> Vec<ServerId> {
        nodes.sort_by(|a, b| {
            b.resources
                .available_memory
                .cmp(&a.resources.available_memory)
        });
        nodes
            .into_iter()
            .take(self.shuffle_nodes_max)
            .map(|n| n.id)
            .collect()
    }
}

fn validate(request: &AssignmentRequest, max_partitions: u32) -> Result<(), PlanError> {
    if request.partition_range_start >= request.partition_range_end {
        return Err(PlanError::InvalidRequest(format!(
            "empty partition range [{}, {})",
            request.partition_range_start, request.partition_range_end
        )));
    }
    let partitions = request.partition_range_end - request.partition_range_start;
    if partitions > max_partitions {
        return Err(PlanError::InvalidRequest(format!(
            "partition range [{}, {}) covers {partitions} partitions, limit is {max_partitions}",
            request.partition_range_start, request.partition_range_end
        )));
    }
    if request.replica_count == 0 {
        return Err(PlanError::InvalidRequest("replica_count must be at least 1".to_string()));
    }
    if request.partition_num_per_range == 0 {
        return Err(PlanError::InvalidRequest(
            "partition_num_per_range must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Round-robin ranges of partitions over `candidates`
///
/// Each range takes the next `replica_count` servers in ring order, starting
/// at an offset derived from the shuffle id so different shuffles lead with
/// different servers. `replica_count <= candidates.len()` keeps replicas
/// distinct.
fn assign_ranges(
    request: &AssignmentRequest,
    candidates: &[ServerId],
) -> BTreeMap<u32, Vec<ServerId>> {
    let n = candidates.len();
    let replicas = request.replica_count as usize;
    let per_range = request.partition_num_per_range;
    let mut cursor = request.shuffle_id.unsigned_abs() as usize % n;

    let mut assignment = BTreeMap::new();
    let mut start = request.partition_range_start;
    while start < request.partition_range_end {
        let end = start
            .saturating_add(per_range)
            .min(request.partition_range_end);
        let servers: Vec<ServerId> = (0..replicas)
            .map(|r| candidates[(cursor + r) % n].clone())
            .collect();
        cursor = (cursor + replicas) % n;

        for partition in start..end {
            assignment.insert(partition, servers.clone());
        }
        start = end;
    }
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use shufflehub_core::models::{HealthSignal, Heartbeat, ServerResources};
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::time::Instant;

    fn register(cluster: &ClusterManager, id: &str, healthy: bool, available_memory: i64) {
        let health = if healthy {
            HealthSignal::healthy(0.1)
        } else {
            HealthSignal::unhealthy(0.99)
        };
        let hb = Heartbeat::new(
            ServerId::from(id),
            "127.0.0.1".to_string(),
            1,
            health,
            TagSet::server_version(),
        )
        .with_resources(ServerResources {
            available_memory,
            ..ServerResources::default()
        });
        cluster.ingest_heartbeat(hb, Instant::now());
    }

    fn request(start: u32, end: u32, replicas: u32) -> AssignmentRequest {
        AssignmentRequest::new("app", 0, start, end, replicas, TagSet::server_version())
    }

    fn setup(servers: &[(&str, bool, i64)]) -> (Arc<ClusterManager>, AssignmentPlanner) {
        let cluster = Arc::new(ClusterManager::new(Duration::from_secs(30)));
        for (id, healthy, mem) in servers {
            register(&cluster, id, *healthy, *mem);
        }
        let planner = AssignmentPlanner::new(cluster.clone(), 9);
        (cluster, planner)
    }

    #[tokio::test]
    async fn test_every_partition_covered_by_healthy_servers() {
        let (_, planner) = setup(&[("a", true, 100), ("b", false, 900), ("c", true, 100)]);

        let plan = planner.plan(&request(0, 10, 2)).unwrap();
        assert_eq!(plan.keys().copied().collect::<Vec<_>>(), (0..10).collect::<Vec<_>>());

        let healthy: HashSet<ServerId> = ["a", "c"].into_iter().map(ServerId::from).collect();
        for servers in plan.values() {
            assert_eq!(servers.len(), 2);
            let distinct: HashSet<&ServerId> = servers.iter().collect();
            assert_eq!(distinct.len(), 2);
            assert!(servers.iter().all(|s| healthy.contains(s)));
        }
    }

    #[tokio::test]
    async fn test_no_healthy_servers_is_internal_error() {
        let (_, planner) = setup(&[("a", false, 100)]);
        let err = planner.plan(&request(0, 1, 1)).unwrap_err();
        assert!(matches!(err, PlanError::NoHealthyServers(_)));
        assert_eq!(err.status_code(), StatusCode::InternalError);

        let (_, empty) = setup(&[]);
        assert_eq!(
            empty.plan(&request(0, 1, 1)).unwrap_err().status_code(),
            StatusCode::InternalError
        );
    }

    #[tokio::test]
    async fn test_tags_restrict_candidates() {
        let (_, planner) = setup(&[("a", true, 100)]);
        let mut req = request(0, 1, 1);
        req.required_tags.insert("gpu");
        assert!(matches!(planner.plan(&req), Err(PlanError::NoHealthyServers(_))));
    }

    #[tokio::test]
    async fn test_not_enough_servers_for_replicas() {
        let (_, planner) = setup(&[("a", true, 100), ("b", true, 100)]);
        let err = planner.plan(&request(0, 4, 3)).unwrap_err();
        assert_eq!(err, PlanError::NotEnoughServers { required: 3, available: 2 });
        assert_eq!(err.status_code(), StatusCode::NotEnoughServers);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (_, planner) = setup(&[("a", true, 100)]);
        assert!(matches!(planner.plan(&request(3, 3, 1)), Err(PlanError::InvalidRequest(_))));
        assert!(matches!(planner.plan(&request(0, 3, 0)), Err(PlanError::InvalidRequest(_))));
        let zero_range = request(0, 3, 1).with_partition_num_per_range(0);
        assert!(matches!(planner.plan(&zero_range), Err(PlanError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_oversized_partition_range_rejected() {
        let (cluster, planner) = setup(&[("a", true, 100)]);
        let err = planner.plan(&request(0, u32::MAX, 1)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidRequest(_)));
        assert_eq!(err.status_code(), StatusCode::InvalidRequest);

        let planner = AssignmentPlanner::new(cluster, 9).with_max_partitions_per_request(10);
        assert_eq!(planner.plan(&request(5, 15, 1)).unwrap().len(), 10);
        assert!(matches!(planner.plan(&request(5, 16, 1)), Err(PlanError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_round_robin_prefers_available_memory() {
        let (_, planner) = setup(&[("low", true, 10), ("high", true, 1000), ("mid", true, 500)]);

        let plan = planner.plan(&request(0, 4, 1)).unwrap();
        let order: Vec<&str> = plan.values().map(|s| s[0].as_str()).collect();
        assert_eq!(order, vec!["high", "mid", "low", "high"]);
    }

    #[tokio::test]
    async fn test_ranges_share_servers() {
        let (_, planner) = setup(&[("a", true, 100), ("b", true, 100)]);

        let plan = planner
            .plan(&request(0, 5, 1).with_partition_num_per_range(2))
            .unwrap();
        assert_eq!(plan[&0], plan[&1]);
        assert_eq!(plan[&2], plan[&3]);
        assert_ne!(plan[&1], plan[&2]);
        // Trailing short range
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[&4], plan[&0]);
    }

    #[tokio::test]
    async fn test_shuffle_id_rotates_leading_server() {
        let (_, planner) = setup(&[("a", true, 100), ("b", true, 100)]);
        let mut req = request(0, 1, 1);
        req.shuffle_id = 1;
        assert_eq!(planner.plan(&req).unwrap()[&0][0].as_str(), "b");
        req.shuffle_id = 2;
        assert_eq!(planner.plan(&req).unwrap()[&0][0].as_str(), "a");
    }

    #[tokio::test]
    async fn test_shuffle_nodes_max_caps_candidates() {
        let cluster = Arc::new(ClusterManager::new(Duration::from_secs(30)));
        for id in ["a", "b", "c"] {
            register(&cluster, id, true, 100);
        }
        let planner = AssignmentPlanner::new(cluster, 2);

        let plan = planner.plan(&request(0, 6, 1)).unwrap();
        let used: HashSet<&str> = plan.values().map(|s| s[0].as_str()).collect();
        assert_eq!(used, HashSet::from(["a", "b"]));
        assert!(matches!(
            planner.plan(&request(0, 1, 3)),
            Err(PlanError::NotEnoughServers { required: 3, available: 2 })
        ));
    }

    #[tokio::test]
    async fn test_plan_sees_health_change_immediately() {
        let (cluster, planner) = setup(&[("a", true, 100)]);
        assert!(planner.plan(&request(0, 1, 1)).is_ok());

        let hb = Heartbeat::new(
            ServerId::from("a"),
            "127.0.0.1".to_string(),
            1,
            HealthSignal::unhealthy(0.99),
            TagSet::server_version(),
        )
        .with_timestamp(i64::MAX);
        cluster.ingest_heartbeat(hb, Instant::now());
        assert!(matches!(planner.plan(&request(0, 1, 1)), Err(PlanError::NoHealthyServers(_))));
    }
}
