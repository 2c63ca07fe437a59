pub mod error;
pub mod health;
pub mod heartbeat;
pub mod server;
pub mod storage;

pub use error::{Error, Result};
pub use health::HealthCheck;
pub use heartbeat::HeartbeatReporter;
pub use server::ShuffleServer;
pub use storage::{DiskUsage, LocalDiskSampler, UsageSampler};
