//! Delivery seam between a shuffle server and its coordinator

use async_trait::async_trait;

use crate::models::{Heartbeat, HeartbeatResponse};
use crate::Result;

/// Something that can carry a heartbeat to the coordinator.
///
/// Implemented by the HTTP [`crate::client::CoordinatorClient`] and by the
/// in-process coordinator service. A failed send is only ever logged by the
/// caller; the coordinator notices the silence through heartbeat expiry.
#[async_trait]
pub trait HeartbeatSink: Send + Sync {
    async fn send_heartbeat(&self, heartbeat: Heartbeat) -> Result<HeartbeatResponse>;
}
