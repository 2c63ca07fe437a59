pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod sink;

pub use client::CoordinatorClient;
pub use config::Config;
pub use error::{Error, Result};
pub use sink::HeartbeatSink;
