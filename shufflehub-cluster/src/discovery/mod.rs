//! Shuffle server discovery and liveness tracking

pub mod app_manager;
pub mod cluster_manager;

pub use app_manager::ApplicationManager;
pub use cluster_manager::{ClusterManager, HeartbeatResult, ServerNode};
