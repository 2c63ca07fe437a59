//! Error types for the coordinator crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] shufflehub_core::Error),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, Error>;
