//! Request-facing coordinator facade
//!
//! Turns registry and planner outcomes into status-coded responses. Nothing
//! here returns an error to the caller: lack of capacity is a status, and
//! bookkeeping problems are logged and absorbed.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;

use shufflehub_core::config::CoordinatorConfig;
use shufflehub_core::metrics::coordinator as metrics;
use shufflehub_core::models::{
    AppHeartbeatResponse, AssignmentRequest, AssignmentResponse, Heartbeat, HeartbeatResponse,
    ServerInfo, ServerListResponse, StatusCode, TagSet,
};
use shufflehub_core::HeartbeatSink;

use crate::assignment::{AssignmentPlanner, PlanError};
use crate::discovery::{ApplicationManager, ClusterManager};

#[derive(Clone)]
pub struct CoordinatorService {
    cluster: Arc<ClusterManager>,
    planner: Arc<AssignmentPlanner>,
    apps: Arc<ApplicationManager>,
}

impl CoordinatorService {
    #[must_use]
    pub fn new(
        cluster: Arc<ClusterManager>,
        apps: Arc<ApplicationManager>,
        shuffle_nodes_max: usize,
    ) -> Self {
        let planner = AssignmentPlanner::new(cluster.clone(), shuffle_nodes_max);
        Self::with_planner(cluster, apps, planner)
    }

    /// Build the service from coordinator settings
    #[must_use]
    pub fn from_config(
        cluster: Arc<ClusterManager>,
        apps: Arc<ApplicationManager>,
        config: &CoordinatorConfig,
    ) -> Self {
        let planner = AssignmentPlanner::new(cluster.clone(), config.shuffle_nodes_max)
            .with_max_partitions_per_request(config.max_partitions_per_request);
        Self::with_planner(cluster, apps, planner)
    }

    fn with_planner(
        cluster: Arc<ClusterManager>,
        apps: Arc<ApplicationManager>,
        planner: AssignmentPlanner,
    ) -> Self {
        Self {
            cluster,
            planner: Arc::new(planner),
            apps,
        }
    }

    #[must_use]
    pub const fn cluster(&self) -> &Arc<ClusterManager> {
        &self.cluster
    }

    #[must_use]
    pub const fn apps(&self) -> &Arc<ApplicationManager> {
        &self.apps
    }

    pub fn heartbeat(&self, heartbeat: Heartbeat) -> HeartbeatResponse {
        let result = self.cluster.ingest_heartbeat(heartbeat, Instant::now());
        HeartbeatResponse {
            accepted: result.is_applied(),
        }
    }

    /// Identities of live, healthy servers carrying `tags`
    #[must_use]
    pub fn get_server_list(&self, tags: &TagSet) -> ServerListResponse {
        let servers = self
            .cluster
            .get_healthy_nodes(tags)
            .into_iter()
            .map(|node| node.id)
            .collect();
        ServerListResponse::new(servers)
    }

    /// Every live server carrying `tags`, healthy or not
    #[must_use]
    pub fn get_all_servers(&self, tags: &TagSet) -> Vec<ServerInfo> {
        self.cluster
            .get_all_nodes(tags)
            .iter()
            .map(|node| node.to_info())
            .collect()
    }

    pub fn get_shuffle_assignments(&self, request: &AssignmentRequest) -> AssignmentResponse {
        if request.app_id.is_empty() {
            return Self::record(AssignmentResponse::failure(
                StatusCode::InvalidRequest,
                "app_id must not be empty",
            ));
        }
        self.apps.refresh_app(&request.app_id, Instant::now());

        let response = match self.planner.plan(request) {
            Ok(partition_to_servers) => AssignmentResponse::success(partition_to_servers),
            Err(err) => {
                match &err {
                    PlanError::InvalidRequest(_) => tracing::debug!(
                        app_id = %request.app_id,
                        error = %err,
                        "Rejected assignment request"
                    ),
                    _ => tracing::warn!(
                        app_id = %request.app_id,
                        shuffle_id = request.shuffle_id,
                        error = %err,
                        "Failed to assign shuffle servers"
                    ),
                }
                AssignmentResponse::failure(err.status_code(), err.to_string())
            }
        };
        Self::record(response)
    }

    pub fn app_heartbeat(&self, app_id: &str) -> AppHeartbeatResponse {
        if app_id.is_empty() {
            return AppHeartbeatResponse {
                status: StatusCode::InvalidRequest,
            };
        }
        self.apps.refresh_app(app_id, Instant::now());
        AppHeartbeatResponse {
            status: StatusCode::Success,
        }
    }

    /// Applications seen within the expiry window
    #[must_use]
    pub fn app_ids(&self) -> Vec<String> {
        self.apps.app_ids()
    }

    fn record(response: AssignmentResponse) -> AssignmentResponse {
        metrics::ASSIGNMENT_REQUESTS_TOTAL
            .with_label_values(&[response.status.as_str()])
            .inc();
        response
    }
}

/// In-process delivery, for shuffle servers embedded next to the coordinator
#[async_trait]
impl HeartbeatSink for CoordinatorService {
    async fn send_heartbeat(
        &self,
        heartbeat: Heartbeat,
    ) -> shufflehub_core::Result<HeartbeatResponse> {
        Ok(self.heartbeat(heartbeat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shufflehub_core::models::{HealthSignal, ServerId};
    use std::time::Duration;

    fn service() -> CoordinatorService {
        CoordinatorService::new(
            Arc::new(ClusterManager::new(Duration::from_secs(3))),
            Arc::new(ApplicationManager::new(Duration::from_secs(2))),
            9,
        )
    }

    fn heartbeat(id: &str, healthy: bool, timestamp: i64) -> Heartbeat {
        let health = if healthy {
            HealthSignal::healthy(0.2)
        } else {
            HealthSignal::unhealthy(0.97)
        };
        Heartbeat::new(
            ServerId::from(id),
            "127.0.0.1".to_string(),
            1,
            health,
            TagSet::server_version(),
        )
        .with_timestamp(timestamp)
    }

    fn request() -> AssignmentRequest {
        AssignmentRequest::new("1", 1, 0, 1, 1, TagSet::server_version())
    }

    #[tokio::test]
    async fn test_server_list_counts_live_healthy_members() {
        let svc = service();
        assert!(svc.heartbeat(heartbeat("a", true, 1)).accepted);
        assert!(svc.heartbeat(heartbeat("b", true, 1)).accepted);

        let list = svc.get_server_list(&TagSet::server_version());
        assert_eq!(list.count, 2);
        assert_eq!(list.servers, vec![ServerId::from("a"), ServerId::from("b")]);

        svc.heartbeat(heartbeat("b", false, 2));
        assert_eq!(svc.get_server_list(&TagSet::server_version()).count, 1);
        assert_eq!(svc.get_all_servers(&TagSet::server_version()).len(), 2);
    }

    #[tokio::test]
    async fn test_stale_heartbeat_not_accepted() {
        let svc = service();
        svc.heartbeat(heartbeat("a", true, 5));
        assert!(!svc.heartbeat(heartbeat("a", false, 4)).accepted);
    }

    #[tokio::test]
    async fn test_assignment_gated_on_healthy_set() {
        let svc = service();
        let resp = svc.get_shuffle_assignments(&request());
        assert_eq!(resp.status, StatusCode::InternalError);
        assert!(resp.partition_to_servers.is_empty());

        svc.heartbeat(heartbeat("a", true, 1));
        let resp = svc.get_shuffle_assignments(&request());
        assert_eq!(resp.status, StatusCode::Success);
        assert_eq!(resp.partition_to_servers[&0], vec![ServerId::from("a")]);

        svc.heartbeat(heartbeat("a", false, 2));
        let resp = svc.get_shuffle_assignments(&request());
        assert_eq!(resp.status, StatusCode::InternalError);
        assert!(resp.partition_to_servers.is_empty());
    }

    #[tokio::test]
    async fn test_configured_partition_limit_applies() {
        let config = CoordinatorConfig {
            max_partitions_per_request: 4,
            ..CoordinatorConfig::default()
        };
        let svc = CoordinatorService::from_config(
            Arc::new(ClusterManager::new(Duration::from_secs(3))),
            Arc::new(ApplicationManager::new(Duration::from_secs(2))),
            &config,
        );
        svc.heartbeat(heartbeat("a", true, 1));

        let ok = AssignmentRequest::new("1", 1, 0, 4, 1, TagSet::server_version());
        assert_eq!(svc.get_shuffle_assignments(&ok).status, StatusCode::Success);

        let too_wide = AssignmentRequest::new("1", 1, 0, 5, 1, TagSet::server_version());
        let resp = svc.get_shuffle_assignments(&too_wide);
        assert_eq!(resp.status, StatusCode::InvalidRequest);
        assert!(resp.partition_to_servers.is_empty());
    }

    #[tokio::test]
    async fn test_assignment_records_app_activity() {
        let svc = service();
        svc.get_shuffle_assignments(&request());
        // Recorded even though no server could be assigned
        assert!(svc.apps().contains("1"));
    }

    #[tokio::test]
    async fn test_empty_app_id_rejected() {
        let svc = service();
        svc.heartbeat(heartbeat("a", true, 1));
        let mut req = request();
        req.app_id.clear();
        assert_eq!(svc.get_shuffle_assignments(&req).status, StatusCode::InvalidRequest);
        assert_eq!(svc.app_heartbeat("").status, StatusCode::InvalidRequest);
        assert!(svc.apps().app_ids().is_empty());
    }

    #[tokio::test]
    async fn test_app_heartbeat_keeps_app_alive() {
        let svc = service();
        assert_eq!(svc.app_heartbeat("app-7").status, StatusCode::Success);
        assert_eq!(svc.app_ids(), vec!["app-7".to_string()]);
    }

    #[tokio::test]
    async fn test_in_process_sink() {
        let svc = service();
        let resp = svc.send_heartbeat(heartbeat("a", true, 1)).await.unwrap();
        assert!(resp.accepted);
        assert!(svc.cluster().get_node(&ServerId::from("a")).is_some());
    }
}
