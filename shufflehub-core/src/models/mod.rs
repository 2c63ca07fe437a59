pub mod assignment;
pub mod heartbeat;
pub mod id;
pub mod tags;

pub use assignment::{
    AppHeartbeatResponse, AssignmentRequest, AssignmentResponse, ServerInfo, ServerListResponse,
    StatusCode,
};
pub use heartbeat::{HealthSignal, Heartbeat, HeartbeatResponse, ServerResources};
pub use id::ServerId;
pub use tags::{TagSet, SHUFFLE_SERVER_VERSION};
