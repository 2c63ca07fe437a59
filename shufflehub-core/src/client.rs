//! HTTP client for the coordinator API
//!
//! Used by shuffle servers to deliver heartbeats and by shuffle clients to
//! list servers and request partition assignments.

use async_trait::async_trait;
use std::time::Duration;

use crate::models::{
    AppHeartbeatResponse, AssignmentRequest, AssignmentResponse, Heartbeat, HeartbeatResponse,
    ServerInfo, ServerListResponse, TagSet,
};
use crate::sink::HeartbeatSink;
use crate::{Error, Result};

/// Timeout applied to every coordinator call
const REQUEST_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {e}")))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Healthy servers whose tags include `tags`
    pub async fn get_shuffle_server_list(&self, tags: &TagSet) -> Result<ServerListResponse> {
        let resp = self
            .http
            .get(self.url("/api/v1/servers"))
            .query(&[("tags", tags.to_csv())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Every registered server whose tags include `tags`, healthy or not
    pub async fn get_all_servers(&self, tags: &TagSet) -> Result<Vec<ServerInfo>> {
        let resp = self
            .http
            .get(self.url("/api/v1/servers/all"))
            .query(&[("tags", tags.to_csv())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn get_shuffle_assignments(
        &self,
        request: &AssignmentRequest,
    ) -> Result<AssignmentResponse> {
        let resp = self
            .http
            .post(self.url("/api/v1/assignments"))
            .json(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Keep an application alive between assignment requests
    pub async fn app_heartbeat(&self, app_id: &str) -> Result<AppHeartbeatResponse> {
        let resp = self
            .http
            .post(self.url(&format!("/api/v1/apps/{app_id}/heartbeat")))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl HeartbeatSink for CoordinatorClient {
    async fn send_heartbeat(&self, heartbeat: Heartbeat) -> Result<HeartbeatResponse> {
        let resp = self
            .http
            .post(self.url("/api/v1/heartbeat"))
            .json(&heartbeat)
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}
