//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (umask bits, addresses, log levels)
//! - Detect duplicate listener names and pipe paths
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::{ServerConfig, TransportConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("event loop thread name must not be empty")]
    EmptyThreadName,

    #[error("listener #{index} has an empty name")]
    EmptyListenerName { index: usize },

    #[error("listener name '{0}' is used more than once")]
    DuplicateListenerName(String),

    #[error("listener '{name}': host '{host}' is not an IP address")]
    InvalidHost { name: String, host: String },

    #[error("listener '{name}': pipe path must not be empty")]
    EmptyPipePath { name: String },

    #[error("listener '{name}': pipe path '{path}' is used more than once")]
    DuplicatePipePath { name: String, path: String },

    #[error("listener '{name}': umask {mask:#o} has bits outside 0o777")]
    InvalidUmask { name: String, mask: u32 },

    #[error("unknown log level '{0}'")]
    InvalidLogLevel(String),

    #[error("metrics address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.event_loop.thread_name.trim().is_empty() {
        errors.push(ValidationError::EmptyThreadName);
    }

    let mut names = HashSet::new();
    let mut paths = HashSet::new();
    for (index, listener) in config.listeners.iter().enumerate() {
        let name = &listener.name;
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyListenerName { index });
        } else if !names.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateListenerName(name.clone()));
        }

        match &listener.transport {
            TransportConfig::Tcp { host, .. } => {
                if host.parse::<IpAddr>().is_err() {
                    errors.push(ValidationError::InvalidHost {
                        name: name.clone(),
                        host: host.clone(),
                    });
                }
            }
            TransportConfig::Pipe { path, umask } => {
                if path.as_os_str().is_empty() {
                    errors.push(ValidationError::EmptyPipePath { name: name.clone() });
                } else if !paths.insert(path.as_path()) {
                    errors.push(ValidationError::DuplicatePipePath {
                        name: name.clone(),
                        path: path.display().to_string(),
                    });
                }
                if let Some(mask) = umask {
                    if *mask > 0o777 {
                        errors.push(ValidationError::InvalidUmask {
                            name: name.clone(),
                            mask: *mask,
                        });
                    }
                }
            }
        }
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            config.observability.log_level.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
