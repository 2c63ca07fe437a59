pub mod assignment;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod http;
pub mod service;

pub use assignment::{AssignmentPlanner, PlanError};
pub use coordinator::CoordinatorServer;
pub use discovery::{ApplicationManager, ClusterManager, HeartbeatResult, ServerNode};
pub use error::{Error, Result};
pub use service::CoordinatorService;
