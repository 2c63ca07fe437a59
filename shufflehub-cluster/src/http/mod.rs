//! JSON-over-HTTP transport for the coordinator API

pub mod error;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use shufflehub_core::models::{
    AppHeartbeatResponse, AssignmentRequest, AssignmentResponse, Heartbeat, HeartbeatResponse,
    ServerInfo, ServerListResponse, TagSet,
};

use crate::service::CoordinatorService;
pub use error::{ApiError, ApiResult};

/// `?tags=a,b` filter shared by the server list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct TagsQuery {
    #[serde(default)]
    pub tags: Option<String>,
}

impl TagsQuery {
    fn tag_set(&self) -> TagSet {
        self.tags.as_deref().map(TagSet::parse_csv).unwrap_or_default()
    }
}

pub fn create_router(service: CoordinatorService) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/api/v1/heartbeat", post(heartbeat))
        .route("/api/v1/servers", get(server_list))
        .route("/api/v1/servers/all", get(all_servers))
        .route("/api/v1/assignments", post(assignments))
        .route("/api/v1/apps/{app_id}/heartbeat", post(app_heartbeat))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Basic health check (always returns OK if the coordinator is running)
async fn health_check() -> &'static str {
    "OK"
}

async fn metrics() -> ApiResult<String> {
    Ok(shufflehub_core::metrics::gather_metrics()?)
}

async fn heartbeat(
    State(service): State<CoordinatorService>,
    payload: Result<Json<Heartbeat>, JsonRejection>,
) -> ApiResult<Json<HeartbeatResponse>> {
    let Json(heartbeat) = payload?;
    if heartbeat.server_id.as_str().is_empty() {
        return Err(ApiError::bad_request("server_id must not be empty"));
    }
    Ok(Json(service.heartbeat(heartbeat)))
}

async fn server_list(
    State(service): State<CoordinatorService>,
    Query(query): Query<TagsQuery>,
) -> Json<ServerListResponse> {
    Json(service.get_server_list(&query.tag_set()))
}

async fn all_servers(
    State(service): State<CoordinatorService>,
    Query(query): Query<TagsQuery>,
) -> Json<Vec<ServerInfo>> {
    Json(service.get_all_servers(&query.tag_set()))
}

async fn assignments(
    State(service): State<CoordinatorService>,
    payload: Result<Json<AssignmentRequest>, JsonRejection>,
) -> ApiResult<Json<AssignmentResponse>> {
    let Json(request) = payload?;
    Ok(Json(service.get_shuffle_assignments(&request)))
}

async fn app_heartbeat(
    State(service): State<CoordinatorService>,
    Path(app_id): Path<String>,
) -> Json<AppHeartbeatResponse> {
    Json(service.app_heartbeat(&app_id))
}
