use thiserror::Error;

use crate::monitor::models::{OperatorId, TargetId};

/// Errors returned synchronously by registry, access guard and service operations.
///
/// Probe failures never show up here; the scheduler turns them into `Down` results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Invalid target: {0}")]
    Validation(String),
    #[error("Target not found: {0}")]
    NotFound(TargetId),
    #[error("{0} is already a bot admin")]
    AlreadyPresent(OperatorId),
    #[error("{0} is not a bot admin")]
    NotPresent(OperatorId),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
